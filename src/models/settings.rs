use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub const DEFAULT_TILE_SIZE: u32 = 50;
pub const DEFAULT_TILE_DENSITY: u32 = 80;
pub const DEFAULT_OVERLAY_RATIO: f64 = 0.5;

/// Tile placement style understood by the job service.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MosaicStyle {
    #[default]
    Classic,
    Random,
    Flowing,
}

/// Parameters attached to a generation request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct MosaicSettings {
    #[garde(range(min = 10, max = 200))]
    pub tile_size: u32,

    #[garde(range(min = 1, max = 100))]
    pub tile_density: u32,

    #[garde(range(min = 0.0, max = 1.0))]
    pub overlay_ratio: f64,

    #[garde(skip)]
    pub style: MosaicStyle,

    #[garde(skip)]
    pub color_correction: bool,
}

impl Default for MosaicSettings {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            tile_density: DEFAULT_TILE_DENSITY,
            overlay_ratio: DEFAULT_OVERLAY_RATIO,
            style: MosaicStyle::default(),
            color_correction: true,
        }
    }
}

/// Partial settings update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub tile_size: Option<u32>,
    pub tile_density: Option<u32>,
    pub overlay_ratio: Option<f64>,
    pub style: Option<MosaicStyle>,
    pub color_correction: Option<bool>,
}

impl MosaicSettings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(tile_size) = patch.tile_size {
            self.tile_size = tile_size;
        }
        if let Some(tile_density) = patch.tile_density {
            self.tile_density = tile_density;
        }
        if let Some(overlay_ratio) = patch.overlay_ratio {
            self.overlay_ratio = overlay_ratio;
        }
        if let Some(style) = patch.style {
            self.style = style;
        }
        if let Some(color_correction) = patch.color_correction {
            self.color_correction = color_correction;
        }
    }
}

/// Everything needed to ask the job service for a new mosaic.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    #[garde(length(min = 1))]
    pub main_image_id: String,

    #[garde(length(min = 1), inner(length(min = 1)))]
    pub tile_image_ids: Vec<String>,

    #[garde(dive)]
    #[serde(flatten)]
    pub settings: MosaicSettings,
}

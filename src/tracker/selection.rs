use garde::Validate;

use crate::models::image::ImageRef;
use crate::models::settings::{GenerationRequest, MosaicSettings, SettingsPatch};
use crate::tracker::session::SessionError;

/// The user's in-progress choice of inputs for the next mosaic.
#[derive(Debug, Clone, Default)]
pub struct MosaicSelection {
    main_image: Option<ImageRef>,
    tile_images: Vec<ImageRef>,
    settings: MosaicSettings,
}

impl MosaicSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn main_image(&self) -> Option<&ImageRef> {
        self.main_image.as_ref()
    }

    pub fn tile_images(&self) -> &[ImageRef] {
        &self.tile_images
    }

    pub fn settings(&self) -> &MosaicSettings {
        &self.settings
    }

    pub fn set_main_image(&mut self, image: ImageRef) {
        self.main_image = Some(image);
    }

    pub fn clear_main_image(&mut self) {
        self.main_image = None;
    }

    /// Append tiles, skipping ids already selected. Returns how many were added.
    pub fn add_tile_images(&mut self, images: impl IntoIterator<Item = ImageRef>) -> usize {
        let before = self.tile_images.len();
        for image in images {
            if !self.tile_images.iter().any(|t| t.id == image.id) {
                self.tile_images.push(image);
            }
        }
        self.tile_images.len() - before
    }

    pub fn remove_tile_image(&mut self, image_id: &str) -> Option<ImageRef> {
        let index = self.tile_images.iter().position(|t| t.id == image_id)?;
        Some(self.tile_images.remove(index))
    }

    pub fn clear_tile_images(&mut self) {
        self.tile_images.clear();
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) {
        self.settings.apply(patch);
    }

    pub fn reset_settings(&mut self) {
        self.settings = MosaicSettings::default();
    }

    /// Build the request the session submits. Fails without a main image,
    /// without tiles, or with out-of-range settings.
    pub fn to_request(&self) -> Result<GenerationRequest, SessionError> {
        let main = self
            .main_image
            .as_ref()
            .ok_or_else(|| SessionError::Validation("no main image selected".to_string()))?;

        let request = GenerationRequest {
            main_image_id: main.id.clone(),
            tile_image_ids: self.tile_images.iter().map(|t| t.id.clone()).collect(),
            settings: self.settings.clone(),
        };
        request.validate()?;
        Ok(request)
    }
}

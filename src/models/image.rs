use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Role an uploaded image plays in a mosaic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageKind {
    Main,
    Tile,
}

/// An image held by the image store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ImageKind,
    pub path: String,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

use crate::models::settings::MosaicStyle;

/// Opaque job identifier assigned by the mosaic job service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Status of a mosaic generation job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position along `pending -> processing -> terminal`.
    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the status order.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }
}

/// Generation parameters echoed back by the job service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_density: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<MosaicStyle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_ratio: Option<f64>,

    /// Overlay expressed as an integer percentage (older payloads).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_adjustment: Option<u32>,
}

impl JobParameters {
    pub fn overlay_ratio(&self) -> Option<f64> {
        self.overlay_ratio
            .or_else(|| self.color_adjustment.map(|pct| f64::from(pct) / 100.0))
    }
}

/// One mosaic generation run, as reported by the job service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub sd_url: Option<String>,
    #[serde(default)]
    pub hd_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub parameters: JobParameters,
}

/// Acknowledgement returned when a generation request is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::job::{Job, JobStatus};

/// Which rendition of a finished mosaic to show.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Quality {
    #[default]
    #[strum(to_string = "standard", serialize = "sd")]
    Standard,
    #[strum(to_string = "high", serialize = "hd")]
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultUnavailable {
    #[error("No mosaic selected")]
    NoJob,

    #[error("Mosaic is not finished (status: {0})")]
    NotCompleted(JobStatus),

    #[error("No {0} quality image available for this mosaic")]
    MissingVariant(Quality),
}

/// Result location for `quality`, taken straight from the job payload.
pub fn select_result(job: &Job, quality: Quality) -> Result<&str, ResultUnavailable> {
    if job.status != JobStatus::Completed {
        return Err(ResultUnavailable::NotCompleted(job.status));
    }

    let location = match quality {
        Quality::Standard => job.sd_url.as_deref(),
        Quality::High => job.hd_url.as_deref(),
    };

    location
        .filter(|url| !url.is_empty())
        .ok_or(ResultUnavailable::MissingVariant(quality))
}

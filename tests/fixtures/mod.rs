//! Job and request builders shared by the integration tests

#![allow(dead_code)]

use chrono::{Duration, Utc};

use mosaic_tracker::models::job::{Job, JobId, JobParameters, JobStatus};
use mosaic_tracker::models::project::ProjectMeta;
use mosaic_tracker::models::settings::{GenerationRequest, MosaicSettings, MosaicStyle};

pub const PROJECT_ID: u64 = 1;

pub fn job(id: &str, status: JobStatus, progress: u8) -> Job {
    Job {
        id: JobId::from(id),
        status,
        progress,
        sd_url: None,
        hd_url: None,
        error: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        parameters: JobParameters {
            tile_size: Some(50),
            tile_density: Some(80),
            style: Some(MosaicStyle::Classic),
            overlay_ratio: Some(0.5),
            color_adjustment: None,
        },
    }
}

pub fn completed(id: &str, sd_url: Option<&str>, hd_url: Option<&str>) -> Job {
    Job {
        sd_url: sd_url.map(str::to_string),
        hd_url: hd_url.map(str::to_string),
        ..job(id, JobStatus::Completed, 100)
    }
}

pub fn failed(id: &str, error: &str) -> Job {
    Job {
        error: Some(error.to_string()),
        ..job(id, JobStatus::Failed, 40)
    }
}

/// A history entry created `minutes_ago` minutes in the past.
pub fn aged(mut job: Job, minutes_ago: i64) -> Job {
    job.created_at = Utc::now() - Duration::minutes(minutes_ago);
    job.updated_at = job.created_at;
    job
}

/// main "m1", five tiles, tile size 50, density 80, overlay 0.5, classic.
pub fn scenario_request() -> GenerationRequest {
    GenerationRequest {
        main_image_id: "m1".to_string(),
        tile_image_ids: ["t1", "t2", "t3", "t4", "t5"]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        settings: MosaicSettings {
            tile_size: 50,
            tile_density: 80,
            overlay_ratio: 0.5,
            style: MosaicStyle::Classic,
            color_correction: true,
        },
    }
}

pub fn project() -> ProjectMeta {
    ProjectMeta {
        id: PROJECT_ID,
        name: "Harbour at dusk".to_string(),
        description: String::new(),
        status: "draft".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

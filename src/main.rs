use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use mosaic_tracker::app_state::AppState;
use mosaic_tracker::config::AppConfig;
use mosaic_tracker::models::job::JobId;
use mosaic_tracker::models::project::ProjectId;
use mosaic_tracker::models::settings::{
    GenerationRequest, MosaicSettings, MosaicStyle, DEFAULT_OVERLAY_RATIO, DEFAULT_TILE_DENSITY,
    DEFAULT_TILE_SIZE,
};
use mosaic_tracker::services::images::{ImageStore, ImageUpload};
use mosaic_tracker::tracker::{Quality, SessionState};

#[derive(Parser)]
#[command(name = "mosaic-tracker", version, about = "Generate photo mosaics and track their progress")]
struct Cli {
    /// Print collected metrics in Prometheus text format to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a project's details
    Project {
        #[arg(long)]
        project_id: ProjectId,
    },
    /// Upload the main image for a project
    UploadMain {
        #[arg(long)]
        project_id: Option<ProjectId>,
        file: PathBuf,
    },
    /// Upload one or more tile images
    UploadTiles {
        #[arg(long)]
        project_id: Option<ProjectId>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Submit a generation job and follow it to completion
    Generate(GenerateArgs),
    /// List previously generated mosaics for a project
    History {
        #[arg(long)]
        project_id: ProjectId,
    },
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long)]
    project_id: ProjectId,
    #[arg(long = "main")]
    main_image_id: String,
    #[arg(long = "tiles", value_delimiter = ',', required = true)]
    tile_image_ids: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    tile_size: u32,
    #[arg(long, default_value_t = DEFAULT_TILE_DENSITY)]
    tile_density: u32,
    #[arg(long, default_value_t = DEFAULT_OVERLAY_RATIO)]
    overlay_ratio: f64,
    #[arg(long, default_value = "classic")]
    style: MosaicStyle,
    #[arg(long)]
    no_color_correction: bool,
    /// Result quality to report (standard|high)
    #[arg(long, default_value = "standard")]
    quality: Quality,
    /// Download the finished mosaic to this path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured logs go to stderr; command output goes to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let state = AppState::from_config(&config)?;

    if state.api.auth().token().is_none() {
        tracing::warn!("AUTH_TOKEN is not set; protected endpoints will reject requests");
    } else if state.api.auth().is_expired(chrono::Utc::now()) {
        tracing::warn!(
            expired_at = ?state.api.auth().expires_at(),
            "AUTH_TOKEN has expired; requests will likely be rejected"
        );
    }

    match cli.command {
        Command::Project { project_id } => {
            let project = state.projects.get_project(project_id).await?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        Command::UploadMain { project_id, file } => {
            let upload = ImageUpload::from_path(&file).await?;
            let image = state.images.upload_main(upload, project_id).await?;
            println!("{}", serde_json::to_string_pretty(&image)?);
        }
        Command::UploadTiles { project_id, files } => {
            let mut uploads = Vec::with_capacity(files.len());
            for file in &files {
                uploads.push(ImageUpload::from_path(file).await?);
            }
            let images = state.images.upload_tiles(uploads, project_id).await?;
            println!("{}", serde_json::to_string_pretty(&images)?);
        }
        Command::Generate(args) => generate(&state, args).await?,
        Command::History { project_id } => {
            let history = state.history_for(project_id);
            history.refresh(state.jobs.as_ref()).await?;
            for job in history.snapshot().iter() {
                println!(
                    "{}\t{}\t{}\t{}",
                    job.id,
                    job.status,
                    job.created_at.to_rfc3339(),
                    job.sd_url.as_deref().unwrap_or("-")
                );
            }
        }
    }

    if cli.metrics {
        eprintln!("{}", prometheus_handle.render());
    }
    Ok(())
}

async fn generate(state: &AppState, args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = state.open_session(args.project_id).await?;

    let request = GenerationRequest {
        main_image_id: args.main_image_id,
        tile_image_ids: args.tile_image_ids,
        settings: MosaicSettings {
            tile_size: args.tile_size,
            tile_density: args.tile_density,
            overlay_ratio: args.overlay_ratio,
            style: args.style,
            color_correction: !args.no_color_correction,
        },
    };

    let job_id: JobId = session.submit(request).await?;
    println!("Submitted mosaic job {}", job_id);

    while let Some(update) = session.next_update().await {
        println!("{}: {}%", update.state, update.progress);
    }

    if session.state() != SessionState::Completed {
        let message = session
            .error_message()
            .unwrap_or_else(|| format!("session ended in state {}", session.state()));
        return Err(message.into());
    }

    let location = session.result(args.quality)?;
    println!("Mosaic ready: {}", state.api.asset_url(&location));

    if let Some(output) = args.output {
        let bytes = state.images.download(&location).await?;
        tokio::fs::write(&output, bytes).await?;
        println!("Saved to {}", output.display());
    }

    session.flush_history_refresh().await;
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(
        "mosaic_jobs_submitted_total",
        "Total mosaic generation jobs submitted"
    );
    metrics::describe_counter!(
        "mosaic_jobs_completed_total",
        "Total mosaic generation jobs observed completing"
    );
    metrics::describe_counter!(
        "mosaic_jobs_failed_total",
        "Total generation attempts that ended in failure"
    );
    metrics::describe_counter!(
        "mosaic_status_polls_total",
        "Total job status requests issued"
    );
    metrics::describe_counter!(
        "mosaic_history_refreshes_total",
        "Total project history refreshes applied"
    );
}

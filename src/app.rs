use crate::cli::{Cli, Commands, SubmitArgs};
use jobrelay::client::ClientError;
use jobrelay::config::{Config, ConfigError};
use jobrelay::context::AppContext;
use jobrelay::events::{EventReceiver, EventSender, JobEvent, Level, Progress};
use jobrelay::humanize::format_duration;
use jobrelay::registry::RegistryError;
use jobrelay::tasks::{self, TaskError};
use jobrelay::transfer::UploadRequest;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] ClientError),

    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("Unknown image type: {0}")]
    UnknownImage(String),

    #[error("No image type given and pipeline {0} has no default image")]
    MissingImageType(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Failed(String),
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    let config = match cli.config {
        Some(path) => Config::load_with_path(path)?,
        None => Config::load()?,
    };

    let ctx = AppContext::from_config(config)?;
    if ctx.tokens.credential().is_some() {
        info!(
            expires_in = %format_duration(ctx.tokens.time_until_expiry()),
            "Session starts with a pre-issued token"
        );
    }
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let (events, rx) = EventSender::channel();
    let renderer = tokio::spawn(render_events(rx, cli.json));

    let result = dispatch(&ctx, cli.command, events, &shutdown).await;

    // All senders are gone once dispatch returns, so the renderer drains and stops
    if let Err(e) = renderer.await {
        warn!(error = %e, "Event renderer stopped abnormally");
    }

    let metrics = ctx.metrics.snapshot();
    info!(
        polls = metrics.polls,
        soft_errors = metrics.soft_errors,
        transfers_completed = metrics.transfers_completed,
        transfers_failed = metrics.transfers_failed,
        bytes_downloaded = metrics.bytes_downloaded,
        logins = metrics.logins,
        "Session metrics"
    );

    result
}

async fn dispatch(
    ctx: &AppContext,
    command: Commands,
    events: EventSender,
    shutdown: &CancellationToken,
) -> Result<(), AppError> {
    match command {
        Commands::Watch { job_id } => {
            let handle = tasks::spawn_poller(ctx.poller(job_id), events, shutdown);
            handle.join().await?.map(|_| ()).map_err(|e| AppError::Failed(e.to_string()))
        }
        Commands::Download { job_id } => {
            let handle = tasks::spawn_download(ctx.engine.clone(), job_id, events, shutdown);
            handle.join().await?.map(|_| ()).map_err(|e| AppError::Failed(e.to_string()))
        }
        Commands::Submit(args) => {
            let request = upload_request(&ctx.config, args)?;
            let handle = tasks::spawn_upload(ctx.engine.clone(), request, events, shutdown);
            handle.join().await?.map(|_| ()).map_err(|e| AppError::Failed(e.to_string()))
        }
        Commands::Jobs { once: true } => {
            let jobs = ctx.registry().list_once(shutdown).await?;
            events.emit(JobEvent::JobsUpdated { jobs });
            Ok(())
        }
        Commands::Jobs { once: false } => {
            let handle = tasks::spawn_registry(Arc::new(ctx.registry()), events, shutdown);
            handle.join().await?;
            Ok(())
        }
    }
}

/// Resolve pipeline and image labels into the upload parameters
fn upload_request(config: &Config, args: SubmitArgs) -> Result<UploadRequest, AppError> {
    let pipeline = match &args.pipeline {
        Some(name) => Some(
            config
                .pipeline(name)
                .ok_or_else(|| AppError::UnknownPipeline(name.clone()))?,
        ),
        None => None,
    };

    let datatype_id = match (args.datatype_id, pipeline) {
        (Some(id), _) => id,
        (None, Some(pipeline)) => pipeline.pipeline.clone(),
        (None, None) => return Err(AppError::Failed("either --datatype-id or --pipeline is required".into())),
    };

    let image_type = match (args.image_type, args.image) {
        (Some(value), _) => value,
        (None, Some(label)) => lookup_image(config, &label)?,
        (None, None) => {
            let pipeline = pipeline.ok_or_else(|| AppError::MissingImageType(datatype_id.clone()))?;
            let label = pipeline
                .image
                .as_deref()
                .ok_or_else(|| AppError::MissingImageType(pipeline.name.clone()))?;
            lookup_image(config, label)?
        }
    };

    Ok(UploadRequest::new(args.file, datatype_id, image_type))
}

fn lookup_image(config: &Config, label: &str) -> Result<String, AppError> {
    config
        .image_type(label)
        .map(str::to_string)
        .ok_or_else(|| AppError::UnknownImage(label.to_string()))
}

async fn render_events(mut rx: EventReceiver, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to encode event"),
            }
            continue;
        }

        match event {
            JobEvent::StatusUpdate { message, level } => match level {
                Level::Info | Level::Success => info!("{message}"),
                Level::Warning => warn!("{message}"),
                Level::Error => error!("{message}"),
            },
            JobEvent::Progress { progress: Progress::Percent(percent) } => info!(percent, "Progress"),
            JobEvent::Progress { progress: Progress::Indeterminate } => info!("Progress: size unknown"),
            JobEvent::TransferCompleted { path, datatype_id } => {
                info!(datatype_id = ?datatype_id, "Artifact saved");
                println!("{}", path.display());
            }
            JobEvent::TransferFailed { message } | JobEvent::JobError { message } => error!("{message}"),
            JobEvent::JobsUpdated { jobs } => {
                for job in &jobs {
                    println!(
                        "{}\t{}",
                        job.id().unwrap_or_else(|| "-".to_string()),
                        job.status().unwrap_or("-")
                    );
                }
            }
            JobEvent::JobFinished => {}
        }
    }
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => return,
    }
    info!("Shutdown signal received, cancelling");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobrelay::config::PipelineConfig;

    fn config() -> Config {
        let mut config = Config::default();
        config.pipelines.push(PipelineConfig {
            name: "Burned area".into(),
            pipeline: "7".into(),
            description: String::new(),
            image: Some("Sentinel-2".into()),
        });
        config.image_types.insert("Sentinel-2".into(), "S2".into());
        config
    }

    fn args(pipeline: Option<&str>, datatype_id: Option<&str>, image: Option<&str>, image_type: Option<&str>) -> SubmitArgs {
        SubmitArgs {
            file: "scene.tif".into(),
            datatype_id: datatype_id.map(str::to_string),
            pipeline: pipeline.map(str::to_string),
            image_type: image_type.map(str::to_string),
            image: image.map(str::to_string),
        }
    }

    #[test]
    fn test_pipeline_default_image() {
        let request = upload_request(&config(), args(Some("Burned area"), None, None, None)).unwrap();
        assert_eq!(request.datatype_id, "7");
        assert_eq!(request.image_type, "S2");
    }

    #[test]
    fn test_explicit_values_win() {
        let request = upload_request(&config(), args(None, Some("12"), None, Some("L8"))).unwrap();
        assert_eq!(request.datatype_id, "12");
        assert_eq!(request.image_type, "L8");
    }

    #[test]
    fn test_unknown_labels() {
        assert!(matches!(
            upload_request(&config(), args(Some("Floods"), None, None, None)),
            Err(AppError::UnknownPipeline(_))
        ));
        assert!(matches!(
            upload_request(&config(), args(None, Some("12"), Some("Landsat"), None)),
            Err(AppError::UnknownImage(_))
        ));
        assert!(matches!(
            upload_request(&config(), args(None, Some("12"), None, None)),
            Err(AppError::MissingImageType(_))
        ));
    }
}

use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use transcoder::config::settings::AppConfig;
use transcoder::infrastructure::db::pool::{connect_to_db, run_migrations};
use transcoder::infrastructure::queue::{RedisWorkQueue, WorkQueue};
use transcoder::infrastructure::redis::client::RedisService;
use transcoder::modules::media::repository::{EpisodeRepository, UploadRepository};
use transcoder::modules::media::store::{EpisodeStore, UploadStore};
use transcoder::modules::transcoding::repository::JobRepository;
use transcoder::modules::transcoding::service::TranscodingService;
use transcoder::modules::transcoding::store::JobStore;
use transcoder::pipeline::encoder::FfmpegEncoder;
use transcoder::pipeline::probe::FfprobeProber;
use transcoder::state::AppState;
use transcoder::workers::{TranscodeWorker, WorkerDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting transcoder...");

    let config = AppConfig::new().context("DATABASE_URL must be set")?;

    let db = connect_to_db(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    run_migrations(&db).await.context("applying migrations")?;
    let redis = RedisService::new(&config.redis_url)
        .await
        .context("connecting to Redis")?;

    let jobs: Arc<dyn JobStore> = Arc::new(JobRepository::new(db.clone()));
    let episodes: Arc<dyn EpisodeStore> = Arc::new(EpisodeRepository::new(db.clone()));
    let uploads: Arc<dyn UploadStore> = Arc::new(UploadRepository::new(db));
    let queue: Arc<dyn WorkQueue> = Arc::new(
        RedisWorkQueue::new(&redis, config.transcoder.queue_key.clone())
            .await
            .context("opening work queue connections")?,
    );

    let shutdown = CancellationToken::new();

    let worker_handle = if config.worker_enabled {
        let settings = &config.transcoder;
        let worker = TranscodeWorker::new(
            WorkerDeps {
                jobs: jobs.clone(),
                episodes: episodes.clone(),
                uploads: uploads.clone(),
                queue: queue.clone(),
                prober: Arc::new(FfprobeProber::new(
                    settings.ffprobe_bin.clone(),
                    settings.probe_timeout,
                )),
                encoder: Arc::new(FfmpegEncoder::new(settings.ffmpeg_settings())),
            },
            settings.clone(),
        );
        let token = shutdown.clone();
        Some(tokio::spawn(async move { worker.run(token).await }))
    } else {
        info!("Transcoder worker disabled");
        None
    };

    let service = TranscodingService::new(jobs, episodes, uploads, queue);
    let port = config.server_port;
    let app = transcoder::app::create_app(AppState::new(config, service));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server running on http://{addr}");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Could not listen for shutdown signal");
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let server_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await
        .context("serving admin API")?;

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task ended abnormally");
        }
    }

    info!("Transcoder stopped");
    Ok(())
}

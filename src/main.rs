use anyhow::{Context, Result};
use clap::Parser;
use meeting_recorder::upload::{UploadQueue, UploadVerifier};
use meeting_recorder::{
    create_router, AppState, Config, FsStorageAdapter, HttpUploadTransport, RecorderService,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "meeting-recorder", about = "Meeting audio recording service")]
struct Args {
    /// Config file (without extension)
    #[arg(long, default_value = "config/meeting-recorder")]
    config: String,

    /// Override the recordings root directory
    #[arg(long)]
    root: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;
    info!("{} starting", cfg.service.name);

    let root = args.root.unwrap_or_else(|| cfg.recording.root_path.clone());
    let store = Arc::new(FsStorageAdapter::new(&root)?) as Arc<dyn meeting_recorder::StorageAdapter>;

    let recorder = RecorderService::new(cfg.recorder_config(), Arc::clone(&store));

    let transport = Arc::new(HttpUploadTransport::new(cfg.upload.api_url.clone())?);
    let verifier = UploadVerifier::new(transport, cfg.upload_config());
    let uploads = UploadQueue::new(
        verifier,
        meeting_recorder::FileLocks::new(),
        Arc::clone(&store),
    );
    uploads.start().await;

    // Pick up anything a previous process left behind before serving.
    match recorder.check_recovery_state().await {
        Ok(recovered) if !recovered.is_empty() => {
            info!("Recovered {} orphaned recording(s)", recovered.len());
        }
        Ok(_) => {}
        Err(e) => warn!("Recovery scan failed: {e}"),
    }

    let state = AppState::new(recorder, uploads);
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    info!("HTTP server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, router).await?;

    Ok(())
}

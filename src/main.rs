use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use sitecheck::analysis::VisionClient;
use sitecheck::models::{MediaItem, Session};
use sitecheck::pipeline::SessionProcessor;
use sitecheck::store::{LocalBlobStore, SqliteStore};
use sitecheck::Settings;

/// A session plus its uploaded media, as produced by the upload flow.
#[derive(Debug, Deserialize)]
struct Manifest {
    session: Session,
    items: Vec<MediaItem>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let manifest_path = std::env::args()
        .nth(1)
        .context("usage: sitecheck <session-manifest.json>")?;
    let manifest: Manifest = serde_json::from_str(
        &std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("failed to read manifest {manifest_path}"))?,
    )
    .context("failed to parse session manifest")?;

    let settings = Settings::from_env()?;
    let blobs = LocalBlobStore::new(settings.blob_root.clone());
    let records = SqliteStore::new(settings.db_path.clone())?;
    let vision = VisionClient::from_settings(&settings)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received, letting the current analysis window finish");
                cancel.cancel();
            }
        });
    }

    let processor = SessionProcessor::new(&settings, &vision, &blobs, &records);
    let result = processor
        .process_session(&manifest.session, &manifest.items, &cancel)
        .await;

    let output = serde_json::json!({
        "outcomes": result.outcomes,
        "report": result.report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

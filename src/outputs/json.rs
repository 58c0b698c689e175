//! JSON snapshot of the current article set.
//!
//! The snapshot is a single pretty-printed array of
//! `{title, url, category, author, publishedAt}` records. It is the only
//! handoff to downstream consumers, so it is replaced atomically: the new
//! document is written to a temporary file next to the target and renamed
//! over it. A failed run leaves the previous snapshot untouched.
//!
//! ```text
//! data/
//! └── latest.json
//! ```

use crate::error::PipelineError;
use crate::models::Article;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Write `articles` to `path`, replacing any existing snapshot atomically.
///
/// # Errors
///
/// [`PipelineError::Serialize`] if encoding fails, [`PipelineError::Persist`]
/// for any I/O failure. In both cases an existing file at `path` is left as
/// it was.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = articles.len()))]
pub async fn write_snapshot(articles: &[Article], path: &Path) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(articles)?;
    let persist = |source: std::io::Error| PipelineError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        info!(dir = %dir.display(), "Ensuring snapshot directory exists");
        fs::create_dir_all(dir).await.map_err(persist)?;
    }

    sweep_stale_temps(path).await;
    let tmp = temp_path(path);
    if let Err(e) = fs::write(&tmp, json).await {
        error!(tmp = %tmp.display(), error = %e, "Failed to write temporary snapshot");
        let _ = fs::remove_file(&tmp).await;
        return Err(persist(e));
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        error!(error = %e, "Failed to move snapshot into place");
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            warn!(tmp = %tmp.display(), error = %cleanup, "Failed to remove temporary snapshot");
        }
        return Err(persist(e));
    }

    info!("Wrote snapshot");
    Ok(())
}

/// Load a snapshot written by [`write_snapshot`].
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_snapshot(path: &Path) -> Result<Vec<Article>, PipelineError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| PipelineError::ReadSnapshot {
            path: path.to_path_buf(),
            source,
        })?;
    let articles: Vec<Article> = serde_json::from_str(&text)?;
    info!(count = articles.len(), "Loaded snapshot");
    Ok(articles)
}

/// Remove temp files left next to `path` by interrupted writes.
async fn sweep_stale_temps(path: &Path) {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return;
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    let prefix = format!(".{}.", name.to_string_lossy());
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !(file_name.starts_with(&prefix) && file_name.ends_with(".tmp")) {
            continue;
        }
        if !entry.file_type().await.is_ok_and(|t| t.is_file()) {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => info!(tmp = %file_name, "Removed stale temporary snapshot"),
            Err(e) => warn!(tmp = %file_name, error = %e, "Failed to remove stale temporary snapshot"),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot.json".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

//! Utility functions
//!
use std::path::Path;

use anyhow::{Context, Result};
use reqwest::Client;

/// Download a file from a URL to a given filepath.
///
/// The body is written to a sibling `.part` file first and renamed once complete, so an
/// interrupted download never leaves a truncated file at `filepath`.
pub async fn download_file(client: &Client, url: &str, filepath: impl AsRef<Path>) -> Result<()> {
    let filepath = filepath.as_ref();
    let resp = client
        .get(url)
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .with_context(|| format!("failed to request {}", url))?;
    let content = resp
        .bytes()
        .await
        .with_context(|| format!("failed to read body of {}", url))?;

    if let Some(parent) = filepath.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = filepath.with_extension("part");
    tokio::fs::write(&partial, &content)
        .await
        .with_context(|| format!("failed to write {}", partial.display()))?;
    tokio::fs::rename(&partial, filepath).await?;

    Ok(())
}

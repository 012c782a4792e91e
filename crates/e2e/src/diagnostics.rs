//! Diagnostic capture: screenshots and page logs
//!
//! Best effort throughout. A capture that fails is logged and skipped; it
//! never changes the outcome of the scenario.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::assertions::excerpt;
use crate::session::ScenarioContext;

const PAGE_EXCERPT_CHARS: usize = 500;

/// A file written during a scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

/// URL, title and a text excerpt of the page at one point in time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub excerpt: String,
}

/// Captures page state for post-mortem debugging
#[async_trait]
pub trait Logger: Send {
    /// Write a screenshot; `None` when capture failed.
    async fn screenshot(&mut self) -> Option<PathBuf>;

    /// Log URL, title and a body excerpt.
    async fn log_page(&mut self) -> PageSnapshot;
}

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Screenshot file name for the n-th capture of a scenario
pub fn screenshot_name(scenario_id: &str, counter: u32) -> String {
    format!("{}-{:03}.png", scenario_id, counter)
}

async fn write_artifact(path: &Path, bytes: &[u8]) -> std::io::Result<Artifact> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(Artifact {
        path: path.to_path_buf(),
        sha256: sha256_hex(bytes),
        bytes: bytes.len() as u64,
    })
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await
}

impl ScenarioContext {
    /// Page snapshot that tolerates a broken page.
    pub(crate) async fn snapshot_page(&mut self) -> PageSnapshot {
        let url = self.page().url().await.unwrap_or_default();
        let title = self.page().title().await.unwrap_or_default();
        let body = self.page().body_text().await.unwrap_or_default();
        PageSnapshot {
            url,
            title,
            excerpt: excerpt(&body, PAGE_EXCERPT_CHARS),
        }
    }
}

#[async_trait]
impl Logger for ScenarioContext {
    async fn screenshot(&mut self) -> Option<PathBuf> {
        self.screenshot_counter += 1;
        let name = screenshot_name(self.scenario_id(), self.screenshot_counter);
        let path = self.artifact_dir().join("screenshots").join(name);

        let bytes = match self.page().screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Screenshot capture failed: {}", e);
                return None;
            }
        };

        match write_artifact(&path, &bytes).await {
            Ok(artifact) => {
                info!("Screenshot saved to {}", path.display());
                self.artifacts.push(artifact);
                Some(path)
            }
            Err(e) => {
                warn!("Could not write screenshot {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn log_page(&mut self) -> PageSnapshot {
        let snapshot = self.snapshot_page().await;
        info!(
            url = %snapshot.url,
            title = %snapshot.title,
            "Page: {}",
            snapshot.excerpt
        );

        let log_path = self.artifact_dir().join("pages.jsonl");
        match serde_json::to_string(&snapshot) {
            Ok(line) => {
                if let Err(e) = append_line(&log_path, &line).await {
                    warn!("Could not append page log {}: {}", log_path.display(), e);
                }
            }
            Err(e) => warn!("Could not encode page snapshot: {}", e),
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screenshot_names_are_ordered() {
        assert_eq!(screenshot_name("mfa-inwebo-va", 1), "mfa-inwebo-va-001.png");
        assert!(screenshot_name("s", 9) < screenshot_name("s", 10));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_write_artifact_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/shot.png");
        let artifact = write_artifact(&path, b"png").await.unwrap();
        assert_eq!(artifact.bytes, 3);
        assert!(path.exists());
    }
}

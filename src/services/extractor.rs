//! Archive extraction service
//!
//! Handles extraction of RAR, ZIP, and 7z archives found in downloaded torrents.
//! Uses the command-line tools (unrar, unzip, 7z) through tokio's process API.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Rar,
    Zip,
    SevenZ,
}

impl ArchiveType {
    /// Archive type from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("rar") => Some(ArchiveType::Rar),
            Some("zip") => Some(ArchiveType::Zip),
            Some("7z") => Some(ArchiveType::SevenZ),
            _ => None,
        }
    }
}

/// Extraction collaborator used by the Archive variant
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest_dir`, keeping the archive's own layout
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()>;
}

/// [`ArchiveExtractor`] that shells out to unrar, unzip or 7z
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandExtractor;

#[async_trait]
impl ArchiveExtractor for CommandExtractor {
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()> {
        let archive_type = ArchiveType::from_path(archive)
            .with_context(|| format!("Unknown archive type: {}", archive.display()))?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .context("Failed to create extraction directory")?;

        info!(
            archive = %archive.display(),
            archive_type = ?archive_type,
            destination = %dest_dir.display(),
            "Extracting archive"
        );

        let (program, mut cmd) = build_command(archive_type, archive, dest_dir);
        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}. Is it installed?", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} failed: {}", program, stderr.trim());
        }

        debug!(archive = %archive.display(), "Extraction successful");
        Ok(())
    }
}

fn build_command(archive_type: ArchiveType, archive: &Path, dest_dir: &Path) -> (&'static str, Command) {
    match archive_type {
        ArchiveType::Rar => {
            let mut cmd = Command::new("unrar");
            cmd.arg("x") // Extract with full paths
                .arg("-o+") // Overwrite existing files
                .arg("-y")
                .arg(archive)
                .arg(dest_dir);
            ("unrar", cmd)
        }
        ArchiveType::Zip => {
            let mut cmd = Command::new("unzip");
            cmd.arg("-o").arg("-q").arg(archive).arg("-d").arg(dest_dir);
            ("unzip", cmd)
        }
        ArchiveType::SevenZ => {
            let mut cmd = Command::new("7z");
            cmd.arg("x")
                .arg("-y")
                .arg(format!("-o{}", dest_dir.display()))
                .arg(archive);
            ("7z", cmd)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_type_from_path() {
        assert_eq!(ArchiveType::from_path(Path::new("file.rar")), Some(ArchiveType::Rar));
        assert_eq!(ArchiveType::from_path(Path::new("file.RAR")), Some(ArchiveType::Rar));
        assert_eq!(ArchiveType::from_path(Path::new("file.zip")), Some(ArchiveType::Zip));
        assert_eq!(ArchiveType::from_path(Path::new("file.7z")), Some(ArchiveType::SevenZ));
        assert_eq!(ArchiveType::from_path(Path::new("file.mkv")), None);
    }

    #[tokio::test]
    async fn test_unknown_archive_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = CommandExtractor
            .extract(Path::new("payload.tar"), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown archive type"));
    }
}

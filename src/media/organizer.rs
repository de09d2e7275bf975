//! Library path layout and file placement
//!
//! Pure path builders for each resource kind, plus the copy and
//! convert-then-move primitives the variants use to put files in place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sanitize_filename::sanitize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::transcoder::{ConvertOptions, MediaConverter};
use crate::error::ProcessError;

/// `{root}/{name} ({year}).{container}`
pub fn movie_path(root: &Path, name: &str, year: i32, container: &str) -> PathBuf {
    root.join(format!("{} ({}).{}", sanitize(name), year, container))
}

/// `{root}/{series}/Season {season}/{series} - {season}x{episode:02} - {title}.{container}`
pub fn episode_path(
    root: &Path,
    series: &str,
    season: u32,
    episode: u32,
    title: &str,
    container: &str,
) -> PathBuf {
    let series = sanitize(series);
    let file_name = format!(
        "{} - {}x{:02} - {}.{}",
        series,
        season,
        episode,
        sanitize(title),
        container
    );
    root.join(&series)
        .join(format!("Season {}", season))
        .join(file_name)
}

/// `{root}/{artist}/{album}/{track:02}_{title}.{container}`
pub fn music_path(
    root: &Path,
    artist: &str,
    album: &str,
    track: u32,
    title: &str,
    container: &str,
) -> PathBuf {
    root.join(sanitize(artist))
        .join(sanitize(album))
        .join(format!("{:02}_{}.{}", track, sanitize(title), container))
}

/// `{root}/{stem}{.ext}` with the original extension kept as-is
pub fn flat_path(root: &Path, stem: &str, extension: Option<&str>) -> PathBuf {
    match extension {
        Some(ext) => root.join(format!("{}.{}", sanitize(stem), ext)),
        None => root.join(sanitize(stem)),
    }
}

/// Sibling of `target` that one conversion writes into before the final rename.
/// `token` keeps concurrent conversions apart; the real extension stays last
/// so the converter still picks the right container.
pub fn partial_path(target: &Path, token: &str) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{}.{}.partial.{}", stem, token, ext.to_string_lossy()),
        None => format!("{}.{}.partial", stem, token),
    };
    target.with_file_name(name)
}

/// `name.ext`, then `name (1).ext`, `name (2).ext`, ...
fn numbered_name(file_name: &Path, n: usize) -> PathBuf {
    if n == 0 {
        return file_name.to_path_buf();
    }
    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.extension() {
        Some(ext) => PathBuf::from(format!("{} ({}).{}", stem, n, ext.to_string_lossy())),
        None => PathBuf::from(format!("{} ({})", stem, n)),
    }
}

const MAX_NUMBERED_COPIES: usize = 10_000;

// ============================================================================
// Target claims
// ============================================================================

/// Library targets taken during one run, keyed by target with the claiming source.
///
/// Two sources that resolve to the same target (two qualities of one movie)
/// must not both be written there: the first claim wins and later sources
/// get `ProcessError::DuplicateTarget`.
#[derive(Debug, Clone, Default)]
pub struct TargetClaims {
    claimed: Arc<Mutex<HashMap<PathBuf, PathBuf>>>,
}

impl TargetClaims {
    /// Claim `target` for `source`. Claiming again for the same source succeeds.
    pub fn claim(&self, target: &Path, source: &Path) -> Result<(), ProcessError> {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        match claimed.get(target) {
            Some(owner) if owner != source => Err(ProcessError::DuplicateTarget {
                path: source.to_path_buf(),
                target: target.to_path_buf(),
                claimed_by: owner.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                claimed.insert(target.to_path_buf(), source.to_path_buf());
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn ensure_parent(path: &Path) -> Result<(), ProcessError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ProcessError::io(parent, e))?;
    }
    Ok(())
}

/// Copy `source` to `target`, creating directories as needed
pub async fn copy_into(source: &Path, target: &Path) -> Result<(), ProcessError> {
    ensure_parent(target).await?;
    tokio::fs::copy(source, target)
        .await
        .map_err(|e| ProcessError::io(source, e))?;
    debug!(source = %source.display(), target = %target.display(), "Copied file");
    Ok(())
}

/// Copy `source` into `dir` under its own file name, numbering the copy
/// instead of overwriting when that name is taken. Returns the copy's path.
pub async fn copy_unique(source: &Path, dir: &Path) -> Result<PathBuf, ProcessError> {
    let file_name = source
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| ProcessError::matching(source.to_string_lossy(), "file name"))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ProcessError::io(dir, e))?;

    for n in 0..MAX_NUMBERED_COPIES {
        let target = dir.join(numbered_name(&file_name, n));
        // create_new reserves the name, so concurrent callers never share a target
        let mut out = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(ProcessError::io(&target, e)),
        };

        let mut input = tokio::fs::File::open(source)
            .await
            .map_err(|e| ProcessError::io(source, e))?;
        tokio::io::copy(&mut input, &mut out)
            .await
            .map_err(|e| ProcessError::io(&target, e))?;
        out.flush().await.map_err(|e| ProcessError::io(&target, e))?;

        debug!(source = %source.display(), target = %target.display(), "Copied file");
        return Ok(target);
    }

    Err(ProcessError::io(
        dir.join(&file_name),
        std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free numbered name"),
    ))
}

/// Convert into a `.partial` sibling unique to this call, then rename into place.
/// The partial output is removed if either step fails.
pub async fn convert_then_move(
    converter: &dyn MediaConverter,
    source: &Path,
    target: &Path,
    options: &ConvertOptions,
) -> Result<(), ProcessError> {
    ensure_parent(target).await?;
    let partial = partial_path(target, &Uuid::new_v4().simple().to_string());

    if let Err(e) = converter.convert(source, &partial, options).await {
        remove_partial(&partial).await;
        return Err(e.into());
    }

    if let Err(e) = tokio::fs::rename(&partial, target).await {
        remove_partial(&partial).await;
        return Err(ProcessError::io(target, e));
    }

    debug!(source = %source.display(), target = %target.display(), "Converted file moved into place");
    Ok(())
}

async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!(path = %partial.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %partial.display(), error = %e, "Failed to remove partial output"),
    }
}

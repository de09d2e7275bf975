//! Application configuration management

use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Datelike;

use crate::services::name_matcher::MatcherRules;

const DEFAULT_BOOK_EXTENSIONS: &[&str] = &["epub", "mobi", "azw3", "pdf", "cbz", "cbr"];
const DEFAULT_MUSIC_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "ogg", "opus", "wav", "wma", "ape"];
const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "wmv", "mov", "m4v", "ts", "webm", "m2ts", "flv", "divx",
];
const DEFAULT_ARCHIVE_EXTENSIONS: &[&str] = &["rar", "zip", "7z"];
const DEFAULT_OTHER_EXTENSIONS: &[&str] = &["srt", "sub", "idx", "ass", "nfo", "txt", "jpg", "png"];

/// Library roots, one per resource kind
#[derive(Debug, Clone)]
pub struct LibraryPaths {
    pub movies: PathBuf,
    pub tv: PathBuf,
    pub music: PathBuf,
    pub books: PathBuf,
    pub other: PathBuf,
    /// Catch-all location archives are extracted into
    pub archives: PathBuf,
}

impl LibraryPaths {
    /// Standard layout below a single media root
    pub fn under(root: &Path) -> Self {
        Self {
            movies: root.join("Movies"),
            tv: root.join("TV"),
            music: root.join("Music"),
            books: root.join("Books"),
            other: root.join("Other"),
            archives: root.join("Other"),
        }
    }
}

/// Extension sets that drive classification (lowercase, no leading dot)
#[derive(Debug, Clone)]
pub struct ExtensionSets {
    pub books: BTreeSet<String>,
    pub music: BTreeSet<String>,
    pub video: BTreeSet<String>,
    pub archive: BTreeSet<String>,
    pub other: BTreeSet<String>,
}

impl Default for ExtensionSets {
    fn default() -> Self {
        Self {
            books: to_set(DEFAULT_BOOK_EXTENSIONS),
            music: to_set(DEFAULT_MUSIC_EXTENSIONS),
            video: to_set(DEFAULT_VIDEO_EXTENSIONS),
            archive: to_set(DEFAULT_ARCHIVE_EXTENSIONS),
            other: to_set(DEFAULT_OTHER_EXTENSIONS),
        }
    }
}

impl ExtensionSets {
    fn named(&self) -> [(&'static str, &BTreeSet<String>); 5] {
        [
            ("books", &self.books),
            ("music", &self.music),
            ("video", &self.video),
            ("archive", &self.archive),
            ("other", &self.other),
        ]
    }

    /// Every configured extension across all kinds
    pub fn all(&self) -> BTreeSet<String> {
        self.named()
            .iter()
            .flat_map(|(_, set)| set.iter().cloned())
            .collect()
    }
}

/// Transcoder settings
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Container extension for converted video (no dot)
    pub video_container: String,
    /// Container extension for converted music (no dot)
    pub audio_container: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub music_codec: String,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_container: "mp4".to_string(),
            audio_container: "mp3".to_string(),
            video_codec: "copy".to_string(),
            audio_codec: "aac".to_string(),
            music_codec: "libmp3lame".to_string(),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL for the ledger
    pub database_url: String,

    pub library: LibraryPaths,

    /// Where files that fail processing are copied, unmodified
    pub failed_path: PathBuf,

    /// Videos shorter than this are rejected (trailers, samples)
    pub min_video_duration_secs: u64,

    /// Number of workers draining the file queue
    pub concurrency: usize,

    pub extensions: ExtensionSets,

    /// Name matching and normalization rules
    pub matcher: MatcherRules,

    /// TMDB API key
    pub tmdb_api_key: Option<String>,

    pub tmdb_url: String,

    pub tvmaze_url: String,

    pub conversion: ConversionSettings,

    /// Also record Archive and Other transformations in the ledger
    pub track_untyped: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let media_root = PathBuf::from(
            env::var("MEDIA_PATH").unwrap_or_else(|_| "./data/media".to_string()),
        );
        let defaults = LibraryPaths::under(&media_root);
        let other = env_path("OTHER_PATH", defaults.other);
        let library = LibraryPaths {
            movies: env_path("MOVIES_PATH", defaults.movies),
            tv: env_path("TV_PATH", defaults.tv),
            music: env_path("MUSIC_PATH", defaults.music),
            books: env_path("BOOKS_PATH", defaults.books),
            archives: env_path("ARCHIVE_PATH", other.clone()),
            other,
        };

        let mut matcher = match env::var("MATCHER_RULES_PATH") {
            Ok(path) => MatcherRules::from_yaml_file(Path::new(&path))
                .with_context(|| format!("Failed to load matcher rules from {}", path))?,
            Err(_) => MatcherRules::default(),
        };
        if let Some(min_year) = env_parse("MIN_YEAR")? {
            matcher.min_year = min_year;
        }
        if let Some(ahead) = env_parse("MAX_YEAR_AHEAD")? {
            matcher.max_year_ahead = ahead;
        }

        let ext_defaults = ExtensionSets::default();
        let extensions = ExtensionSets {
            books: env_set("BOOK_EXTENSIONS", ext_defaults.books),
            music: env_set("MUSIC_EXTENSIONS", ext_defaults.music),
            video: env_set("VIDEO_EXTENSIONS", ext_defaults.video),
            archive: env_set("ARCHIVE_EXTENSIONS", ext_defaults.archive),
            other: env_set("OTHER_EXTENSIONS", ext_defaults.other),
        };

        let conv_defaults = ConversionSettings::default();
        let conversion = ConversionSettings {
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(conv_defaults.ffmpeg_path),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(conv_defaults.ffprobe_path),
            video_container: env::var("VIDEO_CONTAINER").unwrap_or(conv_defaults.video_container),
            audio_container: env::var("AUDIO_CONTAINER").unwrap_or(conv_defaults.audio_container),
            video_codec: env::var("VIDEO_CODEC").unwrap_or(conv_defaults.video_codec),
            audio_codec: env::var("AUDIO_CODEC").unwrap_or(conv_defaults.audio_codec),
            music_codec: env::var("MUSIC_CODEC").unwrap_or(conv_defaults.music_codec),
        };

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/ingest.db".to_string()),
            library,
            failed_path: env_path("FAILED_PATH", PathBuf::from("./data/failed")),
            min_video_duration_secs: env_parse("MIN_VIDEO_DURATION")?.unwrap_or(300),
            concurrency: env_parse("INGEST_CONCURRENCY")?.unwrap_or_else(num_cpus::get),
            extensions,
            matcher,
            tmdb_api_key: env::var("TMDB_API_KEY").ok().filter(|k| !k.is_empty()),
            tmdb_url: env::var("TMDB_URL")
                .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string()),
            tvmaze_url: env::var("TVMAZE_URL")
                .unwrap_or_else(|_| "https://api.tvmaze.com".to_string()),
            conversion,
            track_untyped: env::var("TRACK_UNTYPED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted at a single directory, with an in-memory ledger.
    /// Used by tests and dry runs.
    pub fn for_library(root: &Path) -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            library: LibraryPaths::under(&root.join("library")),
            failed_path: root.join("failed"),
            min_video_duration_secs: 300,
            concurrency: 2,
            extensions: ExtensionSets::default(),
            matcher: MatcherRules::default(),
            tmdb_api_key: None,
            tmdb_url: "https://api.themoviedb.org/3".to_string(),
            tvmaze_url: "https://api.tvmaze.com".to_string(),
            conversion: ConversionSettings::default(),
            track_untyped: false,
        }
    }

    /// Upper bound for accepted release years
    pub fn max_year(&self) -> Result<i32> {
        chrono::Utc::now()
            .year()
            .checked_add(self.matcher.max_year_ahead)
            .with_context(|| format!("MAX_YEAR_AHEAD ({}) is out of range", self.matcher.max_year_ahead))
    }

    /// Reject inconsistent settings up front instead of failing at match time
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("INGEST_CONCURRENCY must be at least 1");
        }

        let max_year = self.max_year()?;
        if self.matcher.min_year > max_year {
            anyhow::bail!(
                "MIN_YEAR ({}) is greater than the maximum accepted year ({})",
                self.matcher.min_year,
                max_year
            );
        }

        if self.matcher.max_normalize_passes == 0 {
            anyhow::bail!("max_normalize_passes must be at least 1");
        }

        let named = self.extensions.named();
        for (name, set) in &named {
            if set.iter().any(|ext| ext.is_empty()) {
                anyhow::bail!("{} extension list contains an empty entry", name);
            }
        }
        for (i, (left_name, left)) in named.iter().enumerate() {
            for (right_name, right) in named.iter().skip(i + 1) {
                if let Some(shared) = left.intersection(right).next() {
                    anyhow::bail!(
                        "Extension '{}' is configured for both {} and {}",
                        shared,
                        left_name,
                        right_name
                    );
                }
            }
        }

        Ok(())
    }
}

fn to_set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}

/// Comma-separated extension list, normalized to lowercase without dots
fn env_set(key: &str, default: BTreeSet<String>) -> BTreeSet<String> {
    match env::var(key) {
        Ok(value) => parse_extension_list(&value),
        Err(_) => default,
    }
}

fn parse_extension_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_extension_sets_are_disjoint() {
        let config = Config::for_library(Path::new("/tmp/lib"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlapping_extensions_rejected() {
        let mut config = Config::for_library(Path::new("/tmp/lib"));
        config.extensions.other.insert("mkv".to_string());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("mkv"), "{}", err);
    }

    #[test]
    fn test_year_bounds_validated() {
        let mut config = Config::for_library(Path::new("/tmp/lib"));
        config.matcher.min_year = 3000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_max_year_ahead_is_an_error() {
        let mut config = Config::for_library(Path::new("/tmp/lib"));
        config.matcher.max_year_ahead = i32::MAX;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("MAX_YEAR_AHEAD"), "{}", err);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::for_library(Path::new("/tmp/lib"));
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_extension_list() {
        let set = parse_extension_list(" .MKV, mp4,,avi ");
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec!["avi".to_string(), "mkv".to_string(), "mp4".to_string()]
        );
    }

    #[test]
    fn test_library_layout() {
        let paths = LibraryPaths::under(Path::new("/media"));
        assert_eq!(paths.movies, PathBuf::from("/media/Movies"));
        assert_eq!(paths.archives, paths.other);
    }
}

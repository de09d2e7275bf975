//! Resource variants and their filing rules
//!
//! A [`Resource`] is one file from a finished download, already classified.
//! `target_path` computes where it belongs in the library and `process`
//! puts it there: copy for books and other files, convert-then-move for
//! audio and video, extraction for archives.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::organizer::{
    TargetClaims, convert_then_move, copy_into, episode_path, flat_path, movie_path, music_path,
};
use super::tags::TagReader;
use super::transcoder::{ConvertOptions, MediaConverter};
use crate::config::Config;
use crate::db::{EpisodeRecord, LedgerRecord, MovieRecord};
use crate::error::{MetadataError, ProcessError};
use crate::services::extractor::ArchiveExtractor;
use crate::services::metadata::MetadataResolver;
use crate::services::name_matcher::{NameMatcher, ParsedName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Book,
    Music,
    Movie,
    Episode,
    Archive,
    Other,
}

impl ResourceKind {
    /// Whether a successful run of this kind is always recorded in the ledger
    pub fn is_typed(&self) -> bool {
        !matches!(self, ResourceKind::Archive | ResourceKind::Other)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Book => "book",
            ResourceKind::Music => "music",
            ResourceKind::Movie => "movie",
            ResourceKind::Episode => "episode",
            ResourceKind::Archive => "archive",
            ResourceKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Shared collaborators every variant may need
#[derive(Clone)]
pub struct ResourceContext {
    pub config: Arc<Config>,
    pub matcher: Arc<NameMatcher>,
    pub resolver: MetadataResolver,
    pub converter: Arc<dyn MediaConverter>,
    pub tags: Arc<dyn TagReader>,
    pub extractor: Arc<dyn ArchiveExtractor>,
    /// Targets already taken in the current run
    pub claims: TargetClaims,
}

/// Where a processed file ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub final_path: PathBuf,
    /// Movie or episode attributes for the ledger's satellite tables
    pub record: Option<LedgerRecord>,
}

/// A classified file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub source_path: PathBuf,
    pub kind: ResourceKind,
    /// Populated for Movie and Episode; empty for kinds that never parse the name
    pub parsed: ParsedName,
}

struct Plan {
    target: PathBuf,
    record: Option<LedgerRecord>,
}

impl Resource {
    pub fn new(source_path: PathBuf, kind: ResourceKind, parsed: ParsedName) -> Self {
        Self {
            source_path,
            kind,
            parsed,
        }
    }

    fn stem(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn extension(&self) -> Option<String> {
        self.source_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
    }

    fn title(&self) -> Result<&str, ProcessError> {
        self.parsed
            .title
            .as_deref()
            .ok_or_else(|| ProcessError::matching(self.stem(), "title"))
    }

    /// Library location this resource would be filed under.
    ///
    /// Movie and Episode consult the metadata services; Music reads tags.
    pub async fn target_path(&self, ctx: &ResourceContext) -> Result<PathBuf, ProcessError> {
        Ok(self.plan(ctx).await?.target)
    }

    /// File the resource into the library
    pub async fn process(&self, ctx: &ResourceContext) -> Result<ProcessOutcome, ProcessError> {
        let config = &ctx.config;

        if matches!(self.kind, ResourceKind::Movie | ResourceKind::Episode) {
            self.check_duration(ctx).await?;
        }

        let plan = self.plan(ctx).await?;
        debug!(
            source = %self.source_path.display(),
            target = %plan.target.display(),
            kind = %self.kind,
            "Filing resource"
        );

        // archives all unpack into the shared catch-all directory
        if self.kind != ResourceKind::Archive {
            ctx.claims.claim(&plan.target, &self.source_path)?;
        }

        match self.kind {
            ResourceKind::Movie | ResourceKind::Episode => {
                let options = ConvertOptions::video(&config.conversion);
                convert_then_move(ctx.converter.as_ref(), &self.source_path, &plan.target, &options)
                    .await?;
            }
            ResourceKind::Music => {
                let options = ConvertOptions::music(&config.conversion);
                convert_then_move(ctx.converter.as_ref(), &self.source_path, &plan.target, &options)
                    .await?;
            }
            ResourceKind::Book | ResourceKind::Other => {
                copy_into(&self.source_path, &plan.target).await?;
            }
            ResourceKind::Archive => {
                tokio::fs::create_dir_all(&plan.target)
                    .await
                    .map_err(|e| ProcessError::io(&plan.target, e))?;
                ctx.extractor
                    .extract(&self.source_path, &plan.target)
                    .await
                    .map_err(ProcessError::Extraction)?;
            }
        }

        info!(
            source = %self.source_path.display(),
            target = %plan.target.display(),
            kind = %self.kind,
            "Resource filed"
        );

        Ok(ProcessOutcome {
            final_path: plan.target,
            record: plan.record,
        })
    }

    async fn plan(&self, ctx: &ResourceContext) -> Result<Plan, ProcessError> {
        let config = &ctx.config;
        let library = &config.library;

        match self.kind {
            ResourceKind::Movie => {
                let found = ctx.resolver.resolve_movie(self.title()?, &self.parsed).await?;
                let year = found.year_released.ok_or_else(|| MetadataError::MissingYear {
                    title: found.name.clone(),
                })?;
                Ok(Plan {
                    target: movie_path(
                        &library.movies,
                        &found.name,
                        year,
                        &config.conversion.video_container,
                    ),
                    record: Some(LedgerRecord::Movie(MovieRecord {
                        title: found.name,
                        year,
                    })),
                })
            }
            ResourceKind::Episode => {
                let found = ctx
                    .resolver
                    .resolve_episode(self.title()?, &self.parsed)
                    .await?;
                let season = found.season.or(self.parsed.season_number).unwrap_or(1);
                let episode = found
                    .episode_number
                    .ok_or_else(|| ProcessError::matching(self.stem(), "episode number"))?;
                let title = found
                    .episode_title
                    .clone()
                    .unwrap_or_else(|| format!("Episode {:02}", episode));
                Ok(Plan {
                    target: episode_path(
                        &library.tv,
                        &found.name,
                        season,
                        episode,
                        &title,
                        &config.conversion.video_container,
                    ),
                    record: Some(LedgerRecord::Episode(EpisodeRecord {
                        series: found.name,
                        season,
                        episode,
                        title,
                        date_aired: found.date_aired,
                    })),
                })
            }
            ResourceKind::Music => {
                let tags = ctx
                    .tags
                    .read(&self.source_path)
                    .await
                    .map_err(ProcessError::Tags)?;
                let name = self.stem();
                let artist = tags
                    .artist
                    .ok_or_else(|| ProcessError::matching(name.as_str(), "artist"))?;
                let album = tags
                    .album
                    .ok_or_else(|| ProcessError::matching(name.as_str(), "album"))?;
                let title = tags
                    .title
                    .ok_or_else(|| ProcessError::matching(name.as_str(), "track title"))?;
                Ok(Plan {
                    target: music_path(
                        &library.music,
                        &artist,
                        &album,
                        tags.track.unwrap_or(0),
                        &title,
                        &config.conversion.audio_container,
                    ),
                    record: None,
                })
            }
            ResourceKind::Book => Ok(Plan {
                target: self.flat_target(ctx, &library.books)?,
                record: None,
            }),
            ResourceKind::Other => Ok(Plan {
                target: self.flat_target(ctx, &library.other)?,
                record: None,
            }),
            ResourceKind::Archive => Ok(Plan {
                target: library.archives.clone(),
                record: None,
            }),
        }
    }

    fn flat_target(&self, ctx: &ResourceContext, root: &Path) -> Result<PathBuf, ProcessError> {
        let stem = self.stem();
        let normalized = ctx.matcher.normalize(&stem)?;
        if normalized.is_empty() {
            return Err(ProcessError::matching(stem, "name"));
        }
        Ok(flat_path(root, &normalized, self.extension().as_deref()))
    }

    async fn check_duration(&self, ctx: &ResourceContext) -> Result<(), ProcessError> {
        let minimum = ctx.config.min_video_duration_secs;
        let probe = ctx.converter.probe(&self.source_path).await?;
        if probe.duration_secs < minimum as f64 {
            return Err(ProcessError::DurationTooShort {
                path: self.source_path.clone(),
                actual: probe.duration_secs,
                minimum,
            });
        }
        Ok(())
    }
}

//! Resource classification
//!
//! An ordered registry of `(kind, extensions, name shape)` rules. The first
//! rule whose extension set contains the file's extension and whose shape
//! accepts the parsed stem decides the kind. Episode is registered before
//! Movie; their shapes are disjoint, so the order only matters for speed.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::ProcessError;
use crate::media::resource::{Resource, ResourceKind};
use crate::services::name_matcher::{NameMatcher, ParsedName};

/// Name constraint a rule puts on the file stem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameShape {
    Any,
    Episode,
    Movie,
}

impl NameShape {
    fn accepts(&self, parsed: &ParsedName) -> bool {
        match self {
            NameShape::Any => true,
            NameShape::Episode => parsed.looks_like_episode(),
            NameShape::Movie => parsed.looks_like_movie(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierRule {
    pub kind: ResourceKind,
    pub extensions: BTreeSet<String>,
    pub shape: NameShape,
}

impl ClassifierRule {
    pub fn new(kind: ResourceKind, extensions: BTreeSet<String>, shape: NameShape) -> Self {
        Self {
            kind,
            extensions,
            shape,
        }
    }
}

pub struct ResourceClassifier {
    matcher: Arc<NameMatcher>,
    rules: Vec<ClassifierRule>,
}

impl ResourceClassifier {
    pub fn new(matcher: Arc<NameMatcher>, rules: Vec<ClassifierRule>) -> Self {
        Self { matcher, rules }
    }

    /// The standard registry: Book, Music, Episode, Movie, Archive, Other
    pub fn from_config(config: &Config, matcher: Arc<NameMatcher>) -> Self {
        let ext = &config.extensions;
        let rules = vec![
            ClassifierRule::new(ResourceKind::Book, ext.books.clone(), NameShape::Any),
            ClassifierRule::new(ResourceKind::Music, ext.music.clone(), NameShape::Any),
            ClassifierRule::new(ResourceKind::Episode, ext.video.clone(), NameShape::Episode),
            ClassifierRule::new(ResourceKind::Movie, ext.video.clone(), NameShape::Movie),
            ClassifierRule::new(ResourceKind::Archive, ext.archive.clone(), NameShape::Any),
            ClassifierRule::new(ResourceKind::Other, ext.other.clone(), NameShape::Any),
        ];
        Self::new(matcher, rules)
    }

    pub fn rules(&self) -> &[ClassifierRule] {
        &self.rules
    }

    /// First matching resource, or `ClassificationNotFound` (a skip)
    pub fn classify(&self, path: &Path) -> Result<Resource, ProcessError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let candidates: Vec<&ClassifierRule> = self
            .rules
            .iter()
            .filter(|rule| rule.extensions.contains(&extension))
            .collect();
        if candidates.is_empty() {
            return Err(ProcessError::ClassificationNotFound(path.to_path_buf()));
        }

        // only names that might be shaped need the matcher
        let parsed = if candidates.iter().any(|rule| rule.shape != NameShape::Any) {
            self.matcher.parse(&stem)?
        } else {
            ParsedName::default()
        };

        let rule = candidates
            .into_iter()
            .find(|rule| rule.shape.accepts(&parsed))
            .ok_or_else(|| ProcessError::ClassificationNotFound(path.to_path_buf()))?;

        debug!(path = %path.display(), kind = %rule.kind, "Classified");
        Ok(Resource::new(path.to_path_buf(), rule.kind, parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn classifier() -> ResourceClassifier {
        let config = Config::for_library(Path::new("/tmp/lib"));
        let matcher = Arc::new(NameMatcher::from_config(&config).unwrap());
        ResourceClassifier::from_config(&config, matcher)
    }

    fn kind_of(path: &str) -> Option<ResourceKind> {
        classifier().classify(Path::new(path)).ok().map(|r| r.kind)
    }

    #[test]
    fn test_registry_order() {
        let kinds: Vec<ResourceKind> = classifier().rules().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Book,
                ResourceKind::Music,
                ResourceKind::Episode,
                ResourceKind::Movie,
                ResourceKind::Archive,
                ResourceKind::Other,
            ]
        );
    }

    #[test]
    fn test_classify_by_extension_and_shape() {
        assert_eq!(kind_of("/dl/Some.Book.epub"), Some(ResourceKind::Book));
        assert_eq!(kind_of("/dl/01 - Track.FLAC"), Some(ResourceKind::Music));
        assert_eq!(
            kind_of("/dl/The.Equalizer.2.2018.720p.BluRay.x264-SPARKS.mkv"),
            Some(ResourceKind::Movie)
        );
        assert_eq!(
            kind_of("/dl/The.Daily.Show.2026.01.07.Stephen.J.Dubner.720p.WEB.h264-EDITH.mkv"),
            Some(ResourceKind::Episode)
        );
        assert_eq!(kind_of("/dl/the.abc.S01E01.mkv"), Some(ResourceKind::Episode));
        assert_eq!(kind_of("/dl/release.part1.rar"), Some(ResourceKind::Archive));
        assert_eq!(kind_of("/dl/release.nfo"), Some(ResourceKind::Other));
    }

    #[test]
    fn test_unknown_extension_is_skip() {
        let err = classifier().classify(Path::new("/dl/thing.xyz")).unwrap_err();
        assert!(err.is_skip());
        assert_matches!(err, ProcessError::ClassificationNotFound(p) if p == PathBuf::from("/dl/thing.xyz"));
    }

    #[test]
    fn test_video_without_title_is_skip() {
        let err = classifier().classify(Path::new("/dl/2018.mkv")).unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn test_extension_sets_are_exclusive_and_exhaustive() {
        let config = Config::for_library(Path::new("/tmp/lib"));
        let c = classifier();

        for ext in config.extensions.all() {
            let any_rules = c
                .rules()
                .iter()
                .filter(|r| r.extensions.contains(&ext) && r.shape == NameShape::Any)
                .count();
            let shaped_rules = c
                .rules()
                .iter()
                .filter(|r| r.extensions.contains(&ext) && r.shape != NameShape::Any)
                .count();

            // either one unconditional rule, or only the shaped video pair
            assert!(
                (any_rules == 1 && shaped_rules == 0) || (any_rules == 0 && shaped_rules == 2),
                "extension {} matched {} plain and {} shaped rules",
                ext,
                any_rules,
                shaped_rules
            );
        }
    }

    #[test]
    fn test_episode_and_movie_shapes_are_disjoint() {
        let config = Config::for_library(Path::new("/tmp/lib"));
        let matcher = NameMatcher::from_config(&config).unwrap();
        let names = [
            "abc.1970.S98E99-def",
            "the.abc.S01E01",
            "abc.series.98.97.of.99-def",
            "abc.97.of.99-def",
            "The.Equalizer.2.2018.720p.BluRay.x264-SPARKS",
            "The.Daily.Show.2026.01.07.Stephen.J.Dubner.720p.WEB.h264-EDITH",
            "plain",
            "",
        ];
        for name in names {
            let parsed = matcher.parse(name).unwrap();
            assert!(
                !(parsed.looks_like_episode() && parsed.looks_like_movie()),
                "{} matched both shapes",
                name
            );
        }
    }
}

//! Pipeline services and external integrations

pub mod classifier;
pub mod extractor;
pub mod job_queue;
pub mod logging;
pub mod metadata;
pub mod name_matcher;
pub mod rate_limiter;
pub mod text_utils;
pub mod tmdb;
pub mod torrent_processor;
pub mod tvmaze;

pub use classifier::{ClassifierRule, NameShape, ResourceClassifier};
pub use extractor::{ArchiveExtractor, CommandExtractor};
pub use job_queue::WorkerPool;
pub use logging::{LogFormat, init_tracing};
pub use metadata::{MetadataMatch, MetadataResolver, MovieService, SeriesService};
pub use name_matcher::{MatcherRules, NameMatcher, ParsedName};
pub use tmdb::TmdbClient;
pub use torrent_processor::{RunSummary, TorrentOrchestrator};
pub use tvmaze::TvMazeClient;

//! Media handling: resource variants, library layout, conversion and tags

pub mod organizer;
pub mod resource;
pub mod tags;
pub mod transcoder;

pub use organizer::TargetClaims;
pub use resource::{ProcessOutcome, Resource, ResourceContext, ResourceKind};
pub use tags::{AudioTags, LoftyTagReader, TagReader};
pub use transcoder::{ConvertOptions, FfmpegConverter, MediaConverter, ProbeResult};

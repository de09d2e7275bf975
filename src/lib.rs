//! Librarian ingest - files completed downloads into a media library
//!
//! Every file of a finished torrent is classified (book, music, movie,
//! episode, archive or other), resolved against metadata services where
//! needed, converted or copied into the library layout, and recorded in a
//! SQLite ledger of `(original, final)` pairs.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod services;

pub use config::Config;
pub use error::ProcessError;

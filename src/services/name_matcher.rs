//! Name matcher for scene-style release names
//!
//! Extracts title, year, air date, season/episode numbers and the episode
//! title fragment from file stems like:
//! - "The.Equalizer.2.2018.720p.BluRay.x264-SPARKS"
//! - "The.Daily.Show.2026.01.07.Stephen.J.Dubner.720p.WEB.h264-EDITH"
//! - "abc.series.98.97.of.99-def"
//!
//! Every pattern and normalization rule lives in [`MatcherRules`], so a
//! deployment can retune matching without a rebuild.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NormalizeError;

/// Parsed attributes of a file stem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedName {
    pub title: Option<String>,
    pub year_released: Option<i32>,
    pub date_aired: Option<NaiveDate>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub episode_title: Option<String>,
}

impl ParsedName {
    /// Shape of an episode: a title plus an episode number or an air date
    pub fn looks_like_episode(&self) -> bool {
        self.title.is_some() && (self.episode_number.is_some() || self.date_aired.is_some())
    }

    /// Shape of a movie: a title and nothing episodic
    pub fn looks_like_movie(&self) -> bool {
        self.title.is_some()
            && self.season_number.is_none()
            && self.episode_number.is_none()
            && self.date_aired.is_none()
    }
}

/// A single `pattern -> replacement` rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub pattern: String,
    pub replacement: String,
}

impl Substitution {
    fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

/// Configurable matching rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherRules {
    /// Lowest accepted release year
    pub min_year: i32,
    /// Years beyond the current one that are still accepted
    pub max_year_ahead: i32,
    /// Upper bound on fixed-point passes in [`NameMatcher::normalize`]
    pub max_normalize_passes: usize,
    /// Anchored pattern that, right after a 4-digit run, marks it as part of a date
    pub date_tail_pattern: String,
    /// `YYYY sep MM sep DD`; groups 1-5 are year, sep, month, sep, day
    pub date_pattern: String,
    pub season_patterns: Vec<String>,
    pub episode_patterns: Vec<String>,
    pub substitutions: Vec<Substitution>,
    pub removals: Vec<String>,
}

impl Default for MatcherRules {
    fn default() -> Self {
        Self {
            min_year: 1900,
            max_year_ahead: 1,
            max_normalize_passes: 100,
            date_tail_pattern: r"^[._\- ]\d{2}[._\- ]\d{2}(?:[^0-9]|$)".to_string(),
            date_pattern: r"(?:^|[^0-9])(\d{4})([._\- /])(\d{2})([._\- /])(\d{2})(?:[^0-9]|$)"
                .to_string(),
            season_patterns: vec![
                r"(?i)(?:^|[^a-z0-9])s(\d{1,3})[ ._-]?e\d{1,3}".to_string(),
                r"(?i)(?:^|[^a-z0-9])(\d{1,2})x\d{2,3}(?:[^a-z0-9]|$)".to_string(),
                r"(?i)(?:^|[^a-z0-9])(?:series|season)[ ._-]?(\d{1,2})(?:[^0-9]|$)".to_string(),
            ],
            episode_patterns: vec![
                r"(?i)(?:^|[^a-z0-9])s\d{1,3}[ ._-]?e(\d{1,3})(?:[ ._-]?e(\d{1,3}))?".to_string(),
                r"(?i)(?:^|[^a-z0-9])\d{1,2}x(\d{2,3})(?:[^a-z0-9]|$)".to_string(),
                r"(?i)(?:^|[^a-z0-9])(\d{1,2})[ ._-]?of[ ._-]?\d{1,2}(?:[^0-9]|$)".to_string(),
                r"(?i)(?:^|[^a-z0-9])(?:part[ ._-]?(\d{1,2})|pt[ ._-]?(\d{1,2}))(?:[^0-9]|$)"
                    .to_string(),
            ],
            substitutions: vec![
                Substitution::new(r"[._]+", " "),
                Substitution::new(r"\s{2,}", " "),
            ],
            removals: vec![
                r"\[[^\]]*\]".to_string(),
                r"(?i)\b(?:480p|576p|720p|1080p|1080i|2160p|4k|x264|x265|h ?26[45]|hevc|xvid|divx|bluray|blu-ray|brrip|bdrip|dvdrip|webrip|web-dl|webdl|hdtv|ddp?\d \d|aac|ac3|dts|atmos|proper|repack)\b".to_string(),
                r"\s+-[A-Za-z0-9]+$".to_string(),
                r"\(\s*\)".to_string(),
                r"^[\s\-]+".to_string(),
                r"[\s\-]+$".to_string(),
            ],
        }
    }
}

impl MatcherRules {
    /// Load rules from a YAML file; missing keys keep their defaults
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&text).context("Failed to parse matcher rules")
    }
}

/// Byte span of a marker in the original name
#[derive(Debug, Clone, Copy)]
struct Marker<T> {
    value: T,
    start: usize,
    end: usize,
}

/// Compiled name matcher
#[derive(Debug, Clone)]
pub struct NameMatcher {
    min_year: i32,
    max_year: i32,
    max_passes: usize,
    digits: Regex,
    date_tail: Regex,
    date: Regex,
    season: Vec<Regex>,
    episode: Vec<Regex>,
    substitutions: Vec<(Regex, String)>,
    removals: Vec<Regex>,
}

impl NameMatcher {
    /// Compile the rule set. `max_year` is the inclusive upper year bound.
    pub fn new(rules: &MatcherRules, max_year: i32) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).with_context(|| format!("Invalid matcher pattern '{}'", pattern))
        };

        Ok(Self {
            min_year: rules.min_year,
            max_year,
            max_passes: rules.max_normalize_passes,
            digits: compile(r"[0-9]+")?,
            date_tail: compile(&rules.date_tail_pattern)?,
            date: compile(&rules.date_pattern)?,
            season: rules
                .season_patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_>>()?,
            episode: rules
                .episode_patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_>>()?,
            substitutions: rules
                .substitutions
                .iter()
                .map(|s| Ok((compile(&s.pattern)?, s.replacement.clone())))
                .collect::<Result<_>>()?,
            removals: rules
                .removals
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_>>()?,
        })
    }

    /// Build from application config
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        Self::new(&config.matcher, config.max_year()?)
    }

    /// Parse every attribute out of a file stem
    pub fn parse(&self, name: &str) -> Result<ParsedName, NormalizeError> {
        let parsed = ParsedName {
            title: self.extract_title(name)?,
            year_released: self.extract_year(name),
            date_aired: self.extract_date_aired(name),
            season_number: self.extract_season_number(name),
            episode_number: self.extract_episode_number(name),
            episode_title: self.extract_episode_title(name)?,
        };

        debug!(
            name = name,
            title = ?parsed.title,
            year = ?parsed.year_released,
            date = ?parsed.date_aired,
            season = ?parsed.season_number,
            episode = ?parsed.episode_number,
            episode_title = ?parsed.episode_title,
            "Parsed name"
        );

        Ok(parsed)
    }

    pub fn extract_year(&self, name: &str) -> Option<i32> {
        self.find_year(name).map(|m| m.value)
    }

    pub fn extract_date_aired(&self, name: &str) -> Option<NaiveDate> {
        self.find_date(name).map(|m| m.value)
    }

    pub fn extract_season_number(&self, name: &str) -> Option<u32> {
        find_numbered(&self.season, name).map(|m| m.value)
    }

    pub fn extract_episode_number(&self, name: &str) -> Option<u32> {
        find_numbered(&self.episode, name).map(|m| m.value)
    }

    /// Everything before the earliest season/episode/date/year marker
    pub fn extract_title(&self, name: &str) -> Result<Option<String>, NormalizeError> {
        let start = [
            find_numbered(&self.season, name).map(|m| m.start),
            find_numbered(&self.episode, name).map(|m| m.start),
            self.find_date(name).map(|m| m.start),
            self.find_year(name).map(|m| m.start),
        ]
        .into_iter()
        .flatten()
        .min();

        match start {
            Some(start) => self.normalize_non_empty(&name[..start]),
            None => Ok(None),
        }
    }

    /// Everything after the latest-ending season/episode/date marker
    pub fn extract_episode_title(&self, name: &str) -> Result<Option<String>, NormalizeError> {
        let end = [
            find_numbered(&self.season, name).map(|m| m.end),
            find_numbered(&self.episode, name).map(|m| m.end),
            self.find_date(name).map(|m| m.end),
        ]
        .into_iter()
        .flatten()
        .max();

        match end {
            Some(end) => self.normalize_non_empty(&name[end..]),
            None => Ok(None),
        }
    }

    /// Apply substitutions and removals until nothing changes.
    ///
    /// Fails if the rules still rewrite the value after `max_normalize_passes`.
    pub fn normalize(&self, value: &str) -> Result<String, NormalizeError> {
        let mut current = value.to_string();

        for _ in 0..self.max_passes {
            let mut next = current.clone();
            for (pattern, replacement) in &self.substitutions {
                next = pattern.replace_all(&next, replacement.as_str()).into_owned();
            }
            for pattern in &self.removals {
                next = pattern.replace_all(&next, "").into_owned();
            }

            if next == current {
                return Ok(current);
            }
            current = next;
        }

        Err(NormalizeError::Diverged {
            input: value.to_string(),
            last: current,
            passes: self.max_passes,
        })
    }

    fn normalize_non_empty(&self, value: &str) -> Result<Option<String>, NormalizeError> {
        let normalized = self.normalize(value)?;
        Ok(if normalized.is_empty() { None } else { Some(normalized) })
    }

    /// First 4-digit run within the year bounds that is not the start of a date
    fn find_year(&self, name: &str) -> Option<Marker<i32>> {
        self.digits
            .find_iter(name)
            .filter(|m| m.as_str().len() == 4)
            .filter(|m| !self.date_tail.is_match(&name[m.end()..]))
            .find_map(|m| {
                let year: i32 = m.as_str().parse().ok()?;
                (self.min_year..=self.max_year).contains(&year).then_some(Marker {
                    value: year,
                    start: m.start(),
                    end: m.end(),
                })
            })
    }

    /// First `YYYY?MM?DD` where both separators agree and the date exists
    fn find_date(&self, name: &str) -> Option<Marker<NaiveDate>> {
        self.date.captures_iter(name).find_map(|caps| {
            if caps.get(2)?.as_str() != caps.get(4)?.as_str() {
                return None;
            }
            let year = caps.get(1)?.as_str().parse().ok()?;
            let month = caps.get(3)?.as_str().parse().ok()?;
            let day = caps.get(5)?.as_str().parse().ok()?;
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            let (start, end) = trim_span(name, caps.get(1)?.start(), caps.get(5)?.end());
            Some(Marker { value: date, start, end })
        })
    }
}

/// Try each pattern in order; the first match yields the maximum of its
/// participating capture groups, with non-participating groups counting as 0.
fn find_numbered(patterns: &[Regex], name: &str) -> Option<Marker<u32>> {
    patterns.iter().find_map(|pattern| {
        let caps = pattern.captures(name)?;
        let value = caps
            .iter()
            .skip(1)
            .map(|group| group.and_then(|g| g.as_str().parse::<u32>().ok()).unwrap_or(0))
            .max()
            .unwrap_or(0);
        let whole = caps.get(0)?;
        let (start, end) = trim_span(name, whole.start(), whole.end());
        Some(Marker { value, start, end })
    })
}

/// Shrink a span so it starts and ends on an alphanumeric character, dropping
/// the boundary separators the patterns consume.
fn trim_span(name: &str, start: usize, end: usize) -> (usize, usize) {
    let slice = &name[start..end];
    let lead = slice.len() - slice.trim_start_matches(|c: char| !c.is_alphanumeric()).len();
    let trail = slice.len() - slice.trim_end_matches(|c: char| !c.is_alphanumeric()).len();
    if lead + trail >= slice.len() {
        return (start, start);
    }
    (start + lead, end - trail)
}

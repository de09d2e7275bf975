//! Metadata resolution for movies and TV episodes
//!
//! Turns a [`ParsedName`] into a canonical [`MetadataMatch`] by querying the
//! movie and series services with progressively looser queries. File names
//! are unreliable, so episode lookup degrades from air date or
//! season/episode number to title similarity before giving up.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EpisodeLookup, MetadataError};
use crate::services::name_matcher::ParsedName;
use crate::services::text_utils::title_similarity;

// ============================================================================
// Service contracts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieQuery {
    pub title: String,
    pub year: Option<i32>,
}

/// A movie returned by a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieCandidate {
    pub title: String,
    pub year_released: Option<i32>,
    /// Popularity or vote score; higher is better
    pub vote_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesQuery {
    pub title: String,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesCandidate {
    pub id: u32,
    pub name: String,
    pub year_premiered: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeCandidate {
    pub season: u32,
    pub number: u32,
    pub name: String,
    pub air_date: Option<NaiveDate>,
}

/// Movie metadata source
#[async_trait]
pub trait MovieService: Send + Sync {
    async fn search_movie(&self, query: &MovieQuery) -> anyhow::Result<Vec<MovieCandidate>>;
}

/// TV metadata source
#[async_trait]
pub trait SeriesService: Send + Sync {
    async fn find_series(&self, query: &SeriesQuery) -> anyhow::Result<Vec<SeriesCandidate>>;

    async fn find_episodes_by_date(
        &self,
        series_id: u32,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<EpisodeCandidate>>;

    async fn find_episodes_by_number(
        &self,
        series_id: u32,
        season: u32,
        episode: u32,
    ) -> anyhow::Result<Vec<EpisodeCandidate>>;

    async fn list_episodes(&self, series_id: u32) -> anyhow::Result<Vec<EpisodeCandidate>>;
}

// ============================================================================
// Resolver
// ============================================================================

/// Canonical identity for a movie or episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMatch {
    /// Movie title or series name
    pub name: String,
    pub year_released: Option<i32>,
    pub season: Option<u32>,
    pub episode_number: Option<u32>,
    pub episode_title: Option<String>,
    pub date_aired: Option<NaiveDate>,
}

/// Resolves parsed names against the injected services
#[derive(Clone)]
pub struct MetadataResolver {
    movies: Arc<dyn MovieService>,
    series: Arc<dyn SeriesService>,
}

impl MetadataResolver {
    pub fn new(movies: Arc<dyn MovieService>, series: Arc<dyn SeriesService>) -> Self {
        Self { movies, series }
    }

    /// Search `{title, year}` then `{title}`; the highest vote score wins and
    /// ties keep the first candidate.
    pub async fn resolve_movie(
        &self,
        title: &str,
        parsed: &ParsedName,
    ) -> Result<MetadataMatch, MetadataError> {
        let mut queries = Vec::with_capacity(2);
        if parsed.year_released.is_some() {
            queries.push(MovieQuery {
                title: title.to_string(),
                year: parsed.year_released,
            });
        }
        queries.push(MovieQuery {
            title: title.to_string(),
            year: None,
        });

        let mut candidates = Vec::new();
        for query in &queries {
            candidates = self
                .movies
                .search_movie(query)
                .await
                .map_err(MetadataError::Service)?;
            debug!(title = %query.title, year = ?query.year, count = candidates.len(), "Movie search");
            if !candidates.is_empty() {
                break;
            }
        }

        let best = pick_highest_score(candidates).ok_or_else(|| MetadataError::MovieNotFound {
            title: title.to_string(),
        })?;

        let year = best
            .year_released
            .or(parsed.year_released)
            .ok_or_else(|| MetadataError::MissingYear {
                title: best.title.clone(),
            })?;

        info!(parsed = %title, title = %best.title, year = year, "Resolved movie");

        Ok(MetadataMatch {
            name: best.title,
            year_released: Some(year),
            season: None,
            episode_number: None,
            episode_title: None,
            date_aired: None,
        })
    }

    /// Resolve the series, then the episode by air date, by number, or by
    /// title similarity.
    pub async fn resolve_episode(
        &self,
        title: &str,
        parsed: &ParsedName,
    ) -> Result<MetadataMatch, MetadataError> {
        let series = self.find_series(title, parsed.year_released).await?;
        let fragment = parsed.episode_title.as_deref();

        let episode = if let Some(date) = parsed.date_aired {
            let episodes = self
                .series
                .find_episodes_by_date(series.id, date)
                .await
                .map_err(MetadataError::Service)?;
            pick_episode(episodes, fragment).ok_or(MetadataError::EpisodeNotFound {
                series: series.name.clone(),
                lookup: EpisodeLookup::ByDate,
            })?
        } else {
            let by_number = match parsed.episode_number {
                Some(number) => {
                    let season = parsed.season_number.unwrap_or(1);
                    let episodes = self
                        .series
                        .find_episodes_by_number(series.id, season, number)
                        .await
                        .map_err(MetadataError::Service)?;
                    episodes.into_iter().next()
                }
                None => None,
            };

            match (by_number, fragment) {
                (Some(episode), _) => episode,
                (None, Some(fragment)) => self.find_episode_by_title(&series, fragment).await?,
                (None, None) => {
                    return Err(MetadataError::EpisodeNotFound {
                        series: series.name.clone(),
                        lookup: EpisodeLookup::ByNumber,
                    });
                }
            }
        };

        let episode_title = if !episode.name.trim().is_empty() {
            episode.name.trim().to_string()
        } else if let Some(fragment) = fragment {
            fragment.to_string()
        } else {
            format!("Episode {:02}", episode.number)
        };

        info!(
            parsed = %title,
            series = %series.name,
            season = episode.season,
            episode = episode.number,
            episode_title = %episode_title,
            "Resolved episode"
        );

        Ok(MetadataMatch {
            name: series.name,
            year_released: series.year_premiered,
            season: Some(episode.season),
            episode_number: Some(episode.number),
            episode_title: Some(episode_title),
            date_aired: episode.air_date.or(parsed.date_aired),
        })
    }

    async fn find_series(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<SeriesCandidate, MetadataError> {
        let mut queries = Vec::with_capacity(2);
        if year.is_some() {
            queries.push(SeriesQuery {
                title: title.to_string(),
                year,
            });
        }
        queries.push(SeriesQuery {
            title: title.to_string(),
            year: None,
        });

        for query in &queries {
            let found = self
                .series
                .find_series(query)
                .await
                .map_err(MetadataError::Service)?;
            if let Some(first) = found.into_iter().next() {
                debug!(title = %title, year = ?query.year, series = %first.name, "Series found");
                return Ok(first);
            }
        }

        Err(MetadataError::SeriesNotFound {
            title: title.to_string(),
        })
    }

    async fn find_episode_by_title(
        &self,
        series: &SeriesCandidate,
        fragment: &str,
    ) -> Result<EpisodeCandidate, MetadataError> {
        let episodes = self
            .series
            .list_episodes(series.id)
            .await
            .map_err(MetadataError::Service)?;

        debug!(
            series = %series.name,
            fragment = %fragment,
            episodes = episodes.len(),
            "Falling back to episode title similarity"
        );

        best_title_match(episodes, fragment).ok_or(MetadataError::EpisodeNotFound {
            series: series.name.clone(),
            lookup: EpisodeLookup::ByTitle,
        })
    }
}

/// Highest score wins; a later candidate must be strictly better to replace
/// an earlier one.
fn pick_highest_score(candidates: Vec<MovieCandidate>) -> Option<MovieCandidate> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(b) if candidate.vote_score <= b.vote_score => Some(b),
        _ => Some(candidate),
    })
}

/// Several episodes can share an air date; prefer the closest title when we have one
fn pick_episode(episodes: Vec<EpisodeCandidate>, fragment: Option<&str>) -> Option<EpisodeCandidate> {
    match fragment {
        Some(fragment) if episodes.len() > 1 => best_title_match(episodes, fragment),
        _ => episodes.into_iter().next(),
    }
}

fn best_title_match(episodes: Vec<EpisodeCandidate>, fragment: &str) -> Option<EpisodeCandidate> {
    episodes
        .into_iter()
        .map(|e| (title_similarity(fragment, &e.name), e))
        .fold(None, |best: Option<(f64, EpisodeCandidate)>, (score, e)| match best {
            Some((best_score, b)) if score <= best_score => Some((best_score, b)),
            _ => Some((score, e)),
        })
        .map(|(_, e)| e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeMovies {
        /// (year filter, results)
        responses: Vec<(Option<i32>, Vec<MovieCandidate>)>,
        queries: Mutex<Vec<MovieQuery>>,
    }

    #[async_trait]
    impl MovieService for FakeMovies {
        async fn search_movie(&self, query: &MovieQuery) -> anyhow::Result<Vec<MovieCandidate>> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self
                .responses
                .iter()
                .find(|(year, _)| *year == query.year)
                .map(|(_, r)| r.clone())
                .unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct FakeSeries {
        series: Vec<SeriesCandidate>,
        episodes: Vec<EpisodeCandidate>,
        number_lookup_works: bool,
    }

    #[async_trait]
    impl SeriesService for FakeSeries {
        async fn find_series(&self, query: &SeriesQuery) -> anyhow::Result<Vec<SeriesCandidate>> {
            if query.year.is_some() {
                return Ok(vec![]);
            }
            Ok(self.series.clone())
        }

        async fn find_episodes_by_date(
            &self,
            _series_id: u32,
            date: NaiveDate,
        ) -> anyhow::Result<Vec<EpisodeCandidate>> {
            Ok(self
                .episodes
                .iter()
                .filter(|e| e.air_date == Some(date))
                .cloned()
                .collect())
        }

        async fn find_episodes_by_number(
            &self,
            _series_id: u32,
            season: u32,
            episode: u32,
        ) -> anyhow::Result<Vec<EpisodeCandidate>> {
            if !self.number_lookup_works {
                return Ok(vec![]);
            }
            Ok(self
                .episodes
                .iter()
                .filter(|e| e.season == season && e.number == episode)
                .cloned()
                .collect())
        }

        async fn list_episodes(&self, _series_id: u32) -> anyhow::Result<Vec<EpisodeCandidate>> {
            Ok(self.episodes.clone())
        }
    }

    fn movie(title: &str, year: Option<i32>, score: f64) -> MovieCandidate {
        MovieCandidate {
            title: title.to_string(),
            year_released: year,
            vote_score: score,
        }
    }

    fn episode(season: u32, number: u32, name: &str, date: Option<(i32, u32, u32)>) -> EpisodeCandidate {
        EpisodeCandidate {
            season,
            number,
            name: name.to_string(),
            air_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        }
    }

    fn daily_show() -> FakeSeries {
        FakeSeries {
            series: vec![SeriesCandidate {
                id: 249,
                name: "The Daily Show".to_string(),
                year_premiered: Some(1996),
            }],
            episodes: vec![
                episode(31, 1, "Jon Stewart", Some((2026, 1, 5))),
                episode(31, 2, "Stephen J. Dubner", Some((2026, 1, 7))),
                episode(31, 3, "", Some((2026, 1, 8))),
            ],
            number_lookup_works: true,
        }
    }

    fn resolver(movies: FakeMovies, series: FakeSeries) -> MetadataResolver {
        MetadataResolver::new(Arc::new(movies), Arc::new(series))
    }

    fn parsed(year: Option<i32>) -> ParsedName {
        ParsedName {
            year_released: year,
            ..ParsedName::default()
        }
    }

    #[tokio::test]
    async fn test_movie_with_year_match() {
        let movies = FakeMovies {
            responses: vec![(Some(2018), vec![movie("The Equalizer 2", Some(2018), 10.0)])],
            ..Default::default()
        };
        let r = resolver(movies, FakeSeries::default());
        let m = r.resolve_movie("The Equalizer 2", &parsed(Some(2018))).await.unwrap();
        assert_eq!(m.name, "The Equalizer 2");
        assert_eq!(m.year_released, Some(2018));
    }

    #[tokio::test]
    async fn test_movie_falls_back_to_title_only() {
        let movies = FakeMovies {
            responses: vec![(None, vec![movie("Heat", Some(1995), 3.0)])],
            ..Default::default()
        };
        let movies = Arc::new(movies);
        let r = MetadataResolver::new(movies.clone(), Arc::new(FakeSeries::default()));
        let m = r.resolve_movie("Heat", &parsed(Some(1996))).await.unwrap();
        assert_eq!(m.year_released, Some(1995));

        let queries = movies.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].year, Some(1996));
        assert_eq!(queries[1].year, None);
    }

    #[tokio::test]
    async fn test_movie_highest_score_first_on_tie() {
        let movies = FakeMovies {
            responses: vec![(
                None,
                vec![
                    movie("Dune", Some(1984), 5.0),
                    movie("Dune", Some(2021), 9.0),
                    movie("Dune: The Sequel", Some(2024), 9.0),
                ],
            )],
            ..Default::default()
        };
        let r = resolver(movies, FakeSeries::default());
        let m = r.resolve_movie("Dune", &parsed(None)).await.unwrap();
        assert_eq!(m.year_released, Some(2021));
    }

    #[tokio::test]
    async fn test_movie_not_found() {
        let r = resolver(FakeMovies::default(), FakeSeries::default());
        let err = r.resolve_movie("Nothing", &parsed(Some(2000))).await.unwrap_err();
        assert_matches!(err, MetadataError::MovieNotFound { title } if title == "Nothing");
    }

    #[tokio::test]
    async fn test_movie_missing_year() {
        let movies = FakeMovies {
            responses: vec![(None, vec![movie("Undated", None, 1.0)])],
            ..Default::default()
        };
        let r = resolver(movies, FakeSeries::default());
        let err = r.resolve_movie("Undated", &parsed(None)).await.unwrap_err();
        assert_matches!(err, MetadataError::MissingYear { .. });
    }

    #[tokio::test]
    async fn test_episode_by_date() {
        let r = resolver(FakeMovies::default(), daily_show());
        let parsed = ParsedName {
            date_aired: NaiveDate::from_ymd_opt(2026, 1, 7),
            ..ParsedName::default()
        };
        let m = r.resolve_episode("The Daily Show", &parsed).await.unwrap();
        assert_eq!(m.name, "The Daily Show");
        assert_eq!(m.season, Some(31));
        assert_eq!(m.episode_number, Some(2));
        assert_eq!(m.episode_title.as_deref(), Some("Stephen J. Dubner"));
    }

    #[tokio::test]
    async fn test_episode_by_date_not_found() {
        let r = resolver(FakeMovies::default(), daily_show());
        let parsed = ParsedName {
            date_aired: NaiveDate::from_ymd_opt(2020, 1, 1),
            ..ParsedName::default()
        };
        let err = r.resolve_episode("The Daily Show", &parsed).await.unwrap_err();
        assert_matches!(err, MetadataError::EpisodeNotFound { lookup: EpisodeLookup::ByDate, .. });
    }

    #[tokio::test]
    async fn test_episode_by_number() {
        let r = resolver(FakeMovies::default(), daily_show());
        let parsed = ParsedName {
            season_number: Some(31),
            episode_number: Some(1),
            ..ParsedName::default()
        };
        let m = r.resolve_episode("The Daily Show", &parsed).await.unwrap();
        assert_eq!(m.episode_title.as_deref(), Some("Jon Stewart"));
    }

    #[tokio::test]
    async fn test_episode_title_fallback() {
        let series = FakeSeries {
            number_lookup_works: false,
            ..daily_show()
        };
        let r = resolver(FakeMovies::default(), series);
        let parsed = ParsedName {
            season_number: Some(9),
            episode_number: Some(9),
            episode_title: Some("Stephen J Dubner".to_string()),
            ..ParsedName::default()
        };
        let m = r.resolve_episode("The Daily Show", &parsed).await.unwrap();
        assert_eq!(m.episode_number, Some(2));
    }

    #[tokio::test]
    async fn test_episode_number_miss_without_fragment() {
        let series = FakeSeries {
            number_lookup_works: false,
            ..daily_show()
        };
        let r = resolver(FakeMovies::default(), series);
        let parsed = ParsedName {
            season_number: Some(1),
            episode_number: Some(1),
            ..ParsedName::default()
        };
        let err = r.resolve_episode("The Daily Show", &parsed).await.unwrap_err();
        assert_matches!(err, MetadataError::EpisodeNotFound { lookup: EpisodeLookup::ByNumber, .. });
    }

    #[tokio::test]
    async fn test_episode_title_fallback_without_episodes() {
        let series = FakeSeries {
            episodes: vec![],
            ..daily_show()
        };
        let r = resolver(FakeMovies::default(), series);
        let parsed = ParsedName {
            episode_number: Some(3),
            episode_title: Some("anything".to_string()),
            ..ParsedName::default()
        };
        let err = r.resolve_episode("The Daily Show", &parsed).await.unwrap_err();
        assert_matches!(err, MetadataError::EpisodeNotFound { lookup: EpisodeLookup::ByTitle, .. });
    }

    #[tokio::test]
    async fn test_series_not_found() {
        let r = resolver(FakeMovies::default(), FakeSeries::default());
        let parsed = ParsedName {
            episode_number: Some(1),
            ..ParsedName::default()
        };
        let err = r.resolve_episode("Unknown", &parsed).await.unwrap_err();
        assert_matches!(err, MetadataError::SeriesNotFound { .. });
    }

    #[tokio::test]
    async fn test_empty_episode_name_uses_fragment_then_number() {
        let r = resolver(FakeMovies::default(), daily_show());
        let parsed = ParsedName {
            season_number: Some(31),
            episode_number: Some(3),
            ..ParsedName::default()
        };
        let m = r.resolve_episode("The Daily Show", &parsed).await.unwrap();
        assert_eq!(m.episode_title.as_deref(), Some("Episode 03"));

        let parsed = ParsedName {
            episode_title: Some("Guest".to_string()),
            ..parsed
        };
        let m = r.resolve_episode("The Daily Show", &parsed).await.unwrap();
        assert_eq!(m.episode_title.as_deref(), Some("Guest"));
    }

    #[test]
    fn test_pick_highest_score_empty() {
        assert_eq!(pick_highest_score(vec![]), None);
    }
}

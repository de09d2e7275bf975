//! TVMaze API client for TV show metadata
//!
//! TVMaze is a free API that doesn't require authentication.
//! Base URL: https://api.tvmaze.com

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::metadata::{EpisodeCandidate, SeriesCandidate, SeriesQuery, SeriesService};
use super::rate_limiter::{
    PermanentError, RateLimitedClient, ResponseExt, RetryConfig, is_retryable, retry_async,
};
use crate::error::parse_air_date;

/// TVMaze API client
pub struct TvMazeClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    retry_config: RetryConfig,
}

/// Show search result from TVMaze
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvMazeSearchResult {
    pub score: f64,
    pub show: TvMazeShow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvMazeShow {
    pub id: u32,
    pub name: String,
    pub premiered: Option<String>,
}

impl TvMazeShow {
    pub fn year(&self) -> Option<i32> {
        self.premiered
            .as_deref()
            .and_then(parse_air_date)
            .map(|d| chrono::Datelike::year(&d))
    }
}

impl From<TvMazeShow> for SeriesCandidate {
    fn from(show: TvMazeShow) -> Self {
        let year_premiered = show.year();
        SeriesCandidate {
            id: show.id,
            name: show.name,
            year_premiered,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvMazeEpisode {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub season: u32,
    /// Specials have no number
    pub number: Option<u32>,
    pub airdate: Option<String>,
}

impl TvMazeEpisode {
    fn into_candidate(self) -> Option<EpisodeCandidate> {
        Some(EpisodeCandidate {
            season: self.season,
            number: self.number?,
            air_date: self.airdate.as_deref().and_then(parse_air_date),
            name: self.name,
        })
    }
}

impl TvMazeClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_tvmaze()),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        }
    }

    /// GET a JSON document; 404 maps to `None` since TVMaze uses it for "no match"
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        operation: &str,
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        let client = self.client.clone();

        retry_async(
            || {
                let url = url.clone();
                let client = client.clone();
                async move {
                    let response = client.get_with_query(&url, query).await?;

                    if response.status() == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if response.is_transient_error() {
                        anyhow::bail!("TVMaze transient failure: {}", response.status());
                    }
                    if !response.status().is_success() {
                        return Err(PermanentError(format!(
                            "TVMaze request failed with status: {}",
                            response.status()
                        ))
                        .into());
                    }

                    let body: T = response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse TVMaze response for {}", url))?;
                    Ok(Some(body))
                }
            },
            &self.retry_config,
            operation,
            is_retryable,
        )
        .await
    }

    /// Search for shows by name
    pub async fn search_shows(&self, query: &str) -> Result<Vec<TvMazeSearchResult>> {
        info!(query = %query, "Searching TVMaze for shows");
        let results: Vec<TvMazeSearchResult> = self
            .get_json("/search/shows", &[("q", query.to_string())], "tvmaze_search_shows")
            .await?
            .unwrap_or_default();
        debug!(count = results.len(), "TVMaze search returned results");
        Ok(results)
    }

    /// Best single match for a name
    pub async fn single_search(&self, query: &str) -> Result<Option<TvMazeShow>> {
        self.get_json(
            "/singlesearch/shows",
            &[("q", query.to_string())],
            "tvmaze_singlesearch",
        )
        .await
    }

    pub async fn get_episodes(&self, tvmaze_id: u32) -> Result<Vec<TvMazeEpisode>> {
        info!(tvmaze_id = tvmaze_id, "Fetching episodes from TVMaze");
        Ok(self
            .get_json(
                &format!("/shows/{}/episodes", tvmaze_id),
                &[],
                "tvmaze_get_episodes",
            )
            .await?
            .unwrap_or_default())
    }

    pub async fn get_episode_by_number(
        &self,
        tvmaze_id: u32,
        season: u32,
        number: u32,
    ) -> Result<Option<TvMazeEpisode>> {
        self.get_json(
            &format!("/shows/{}/episodebynumber", tvmaze_id),
            &[("season", season.to_string()), ("number", number.to_string())],
            "tvmaze_episode_by_number",
        )
        .await
    }

    pub async fn get_episodes_by_date(
        &self,
        tvmaze_id: u32,
        date: NaiveDate,
    ) -> Result<Vec<TvMazeEpisode>> {
        Ok(self
            .get_json(
                &format!("/shows/{}/episodesbydate", tvmaze_id),
                &[("date", date.format("%Y-%m-%d").to_string())],
                "tvmaze_episodes_by_date",
            )
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl SeriesService for TvMazeClient {
    /// TVMaze search has no year filter, so a year narrows the search results
    /// to shows that premiered that year.
    async fn find_series(&self, query: &SeriesQuery) -> Result<Vec<SeriesCandidate>> {
        match query.year {
            Some(year) => Ok(self
                .search_shows(&query.title)
                .await?
                .into_iter()
                .map(|r| SeriesCandidate::from(r.show))
                .filter(|s| s.year_premiered == Some(year))
                .collect()),
            None => {
                if let Some(show) = self.single_search(&query.title).await? {
                    return Ok(vec![show.into()]);
                }
                Ok(self
                    .search_shows(&query.title)
                    .await?
                    .into_iter()
                    .map(|r| r.show.into())
                    .collect())
            }
        }
    }

    async fn find_episodes_by_date(
        &self,
        series_id: u32,
        date: NaiveDate,
    ) -> Result<Vec<EpisodeCandidate>> {
        Ok(self
            .get_episodes_by_date(series_id, date)
            .await?
            .into_iter()
            .filter_map(TvMazeEpisode::into_candidate)
            .collect())
    }

    async fn find_episodes_by_number(
        &self,
        series_id: u32,
        season: u32,
        episode: u32,
    ) -> Result<Vec<EpisodeCandidate>> {
        Ok(self
            .get_episode_by_number(series_id, season, episode)
            .await?
            .and_then(TvMazeEpisode::into_candidate)
            .into_iter()
            .collect())
    }

    async fn list_episodes(&self, series_id: u32) -> Result<Vec<EpisodeCandidate>> {
        Ok(self
            .get_episodes(series_id)
            .await?
            .into_iter()
            .filter_map(TvMazeEpisode::into_candidate)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_year() {
        let show: TvMazeShow =
            serde_json::from_str(r#"{"id": 249, "name": "The Daily Show", "premiered": "1996-07-22"}"#)
                .unwrap();
        assert_eq!(show.year(), Some(1996));
        let candidate = SeriesCandidate::from(show);
        assert_eq!(candidate.id, 249);
        assert_eq!(candidate.year_premiered, Some(1996));
    }

    #[test]
    fn test_episode_parsing() {
        let json = r#"[
            {"id": 1, "name": "Stephen J. Dubner", "season": 31, "number": 2, "airdate": "2026-01-07"},
            {"id": 2, "name": "Special", "season": 31, "number": null, "airdate": ""}
        ]"#;
        let episodes: Vec<TvMazeEpisode> = serde_json::from_str(json).unwrap();
        let candidates: Vec<_> = episodes
            .into_iter()
            .filter_map(TvMazeEpisode::into_candidate)
            .collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].air_date, NaiveDate::from_ymd_opt(2026, 1, 7));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = TvMazeClient::new("https://api.tvmaze.com/".to_string());
        assert_eq!(client.base_url, "https://api.tvmaze.com");
    }
}

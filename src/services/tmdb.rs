//! TMDB (The Movie Database) API client for movie metadata
//!
//! Base URL: https://api.themoviedb.org/3
//!
//! Rate limiting: TMDB allows ~40 requests per 10 seconds.
//! This client uses rate limiting and retry logic to handle this gracefully.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::metadata::{MovieCandidate, MovieQuery, MovieService};
use super::rate_limiter::{
    PermanentError, RateLimitedClient, ResponseExt, RetryConfig, is_retryable, retry_async,
};

/// TMDB API client with rate limiting and retry logic
pub struct TmdbClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: String,
    retry_config: RetryConfig,
}

/// Movie search result from TMDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbMovieSearchResult {
    pub page: i32,
    pub results: Vec<TmdbMovie>,
    pub total_pages: i32,
    pub total_results: i32,
}

/// Movie entry from TMDB search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbMovie {
    pub id: i32,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i32>,
    pub popularity: Option<f64>,
}

impl TmdbMovie {
    /// Year from `release_date` ("YYYY-MM-DD"; TMDB sends "" for unknown)
    pub fn year(&self) -> Option<i32> {
        self.release_date
            .as_deref()
            .filter(|d| d.len() >= 4)
            .and_then(|d| d[..4].parse().ok())
    }
}

impl From<TmdbMovie> for MovieCandidate {
    fn from(movie: TmdbMovie) -> Self {
        let year_released = movie.year();
        MovieCandidate {
            title: movie.title,
            year_released,
            vote_score: movie.popularity.unwrap_or(0.0),
        }
    }
}

impl TmdbClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_tmdb()),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry_config: RetryConfig::default(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Search for movies by name
    pub async fn search_movies(&self, query: &str, year: Option<i32>) -> Result<Vec<TmdbMovie>> {
        if !self.has_api_key() {
            anyhow::bail!("TMDB API key not configured");
        }

        info!(query = %query, year = ?year, "Searching TMDB for movie");

        let url = format!("{}/search/movie", self.base_url);
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let query_owned = query.to_string();

        let result = retry_async(
            || {
                let url = url.clone();
                let client = client.clone();
                let q = query_owned.clone();
                let key = api_key.clone();
                async move {
                    let mut query_params: Vec<(&str, String)> = vec![
                        ("api_key", key),
                        ("query", q),
                        ("include_adult", "false".to_string()),
                    ];
                    if let Some(y) = year {
                        query_params.push(("year", y.to_string()));
                    }

                    let response = client.get_with_query(&url, &query_params).await?;

                    if response.status().as_u16() == 429 {
                        warn!("TMDB rate limit hit, will retry");
                        anyhow::bail!("Rate limited (429)");
                    }

                    if response.status().as_u16() == 401 {
                        return Err(PermanentError("TMDB API key is invalid".to_string()).into());
                    }

                    if response.is_transient_error() {
                        anyhow::bail!("TMDB transient failure: {}", response.status());
                    }

                    if !response.status().is_success() {
                        return Err(PermanentError(format!(
                            "TMDB search failed with status: {}",
                            response.status()
                        ))
                        .into());
                    }

                    let results: TmdbMovieSearchResult = response
                        .json()
                        .await
                        .context("Failed to parse TMDB search results")?;

                    Ok(results.results)
                }
            },
            &self.retry_config,
            "tmdb_search_movies",
            is_retryable,
        )
        .await?;

        debug!(count = result.len(), "TMDB search returned results");
        Ok(result)
    }
}

#[async_trait]
impl MovieService for TmdbClient {
    async fn search_movie(&self, query: &MovieQuery) -> Result<Vec<MovieCandidate>> {
        let movies = self.search_movies(&query.title, query.year).await?;
        Ok(movies.into_iter().map(MovieCandidate::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(release_date: Option<&str>, popularity: Option<f64>) -> TmdbMovie {
        TmdbMovie {
            id: 345887,
            title: "The Equalizer 2".to_string(),
            original_title: None,
            release_date: release_date.map(String::from),
            vote_average: Some(6.7),
            vote_count: Some(5000),
            popularity,
        }
    }

    #[test]
    fn test_year_parsing() {
        assert_eq!(movie(Some("2018-07-19"), None).year(), Some(2018));
        assert_eq!(movie(Some(""), None).year(), None);
        assert_eq!(movie(None, None).year(), None);
    }

    #[test]
    fn test_candidate_uses_popularity() {
        let candidate = MovieCandidate::from(movie(Some("2018-07-19"), Some(42.5)));
        assert_eq!(candidate.title, "The Equalizer 2");
        assert_eq!(candidate.year_released, Some(2018));
        assert!((candidate.vote_score - 42.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_search_response_parsing() {
        let json = r#"{
            "page": 1,
            "results": [{"id": 1, "title": "Heat", "release_date": "1995-12-15", "popularity": 30.1}],
            "total_pages": 1,
            "total_results": 1
        }"#;
        let parsed: TmdbMovieSearchResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results[0].year(), Some(1995));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = TmdbClient::new(String::new(), "http://localhost".to_string());
        assert!(client.search_movies("Heat", None).await.is_err());
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::env;
use thiserror::Error;

const TMDB_BASE: &str = "https://api.themoviedb.org/3";
const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";
const IMDB_BASE: &str = "https://www.imdb.com/title";

/// Failures from the TMDB adapter. `Network` and `Status` abort the whole
/// fetch; `Decode` and `MissingDirector` mean the upstream data did not have
/// the shape we need and callers decide whether to skip or propagate.
#[derive(Debug, Error)]
pub enum TmdbError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} -> {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("decoding response from {url} failed: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("movie {id} ('{title}') has no credited director")]
    MissingDirector { id: i32, title: String },
}

/// One movie as returned by the top-rated listing, before enrichment.
#[derive(Debug, Clone, Deserialize)]
pub struct ListedMovie {
    pub id: i32,
    pub title: String,
    pub poster_path: Option<String>,
    pub vote_average: f32,
    #[serde(default)]
    pub release_date: String,
}

/// A fully enriched movie record: listing fields plus the director name from
/// the credits and the IMDB id from the detail endpoint. Immutable once built.
#[derive(Debug, Clone)]
pub struct MovieSummary {
    pub id: i32,
    pub title: String,
    pub poster_path: Option<String>,
    pub vote_average: f32,
    pub release_date: String,
    pub director: String,
    pub imdb_id: Option<String>,
}

impl MovieSummary {
    pub fn poster_url(&self) -> Option<String> {
        self.poster_path
            .as_ref()
            .map(|p| format!("{POSTER_BASE}{p}"))
    }

    pub fn imdb_url(&self) -> Option<String> {
        self.imdb_id.as_ref().map(|id| format!("{IMDB_BASE}/{id}"))
    }

    /// Leading "YYYY" of the release date, if the listing carried one.
    pub fn release_year(&self) -> Option<&str> {
        self.release_date.split('-').next().filter(|y| !y.is_empty())
    }
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn top_rated_page(&self, page: u32) -> Result<Vec<ListedMovie>, TmdbError>;
    async fn enrich_movie(&self, listed: ListedMovie) -> Result<MovieSummary, TmdbError>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
}

impl TmdbClient {
    pub fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
        Ok(Self {
            client: Client::new(),
            api_key,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, TmdbError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TmdbError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = res.status();
        let text = res.text().await.map_err(|e| TmdbError::Network {
            url: url.to_string(),
            source: e,
        })?;
        if !status.is_success() {
            return Err(TmdbError::Status {
                url: url.to_string(),
                status,
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| TmdbError::Decode {
            url: url.to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn top_rated_page(&self, page: u32) -> Result<Vec<ListedMovie>, TmdbError> {
        let url = format!(
            "{TMDB_BASE}/movie/top_rated?api_key={}&region=US&page={page}",
            self.api_key
        );
        let data: ListingPage = self.get_json(&url).await?;
        Ok(data.results)
    }

    async fn enrich_movie(&self, listed: ListedMovie) -> Result<MovieSummary, TmdbError> {
        let url_detail = format!("{TMDB_BASE}/movie/{}?api_key={}", listed.id, self.api_key);
        let url_credits = format!(
            "{TMDB_BASE}/movie/{}/credits?api_key={}",
            listed.id, self.api_key
        );

        let (detail, credits) = tokio::try_join!(
            self.get_json::<MovieDetail>(&url_detail),
            self.get_json::<Credits>(&url_credits),
        )?;

        let director = director_from_crew(credits).ok_or_else(|| TmdbError::MissingDirector {
            id: listed.id,
            title: listed.title.clone(),
        })?;

        Ok(MovieSummary {
            id: listed.id,
            title: listed.title,
            poster_path: listed.poster_path,
            vote_average: listed.vote_average,
            release_date: listed.release_date,
            director,
            imdb_id: detail.imdb_id,
        })
    }
}

fn director_from_crew(credits: Credits) -> Option<String> {
    credits
        .crew
        .unwrap_or_default()
        .into_iter()
        .find(|c| matches!(c.job.as_deref(), Some("Director")))
        .map(|c| c.name)
}

#[derive(Debug, Deserialize)]
struct ListingPage {
    results: Vec<ListedMovie>,
}

#[derive(Debug, Deserialize)]
struct MovieDetail {
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Credits {
    crew: Option<Vec<CrewMember>>,
}

#[derive(Debug, Deserialize)]
struct CrewMember {
    job: Option<String>,
    name: String,
}

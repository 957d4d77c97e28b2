use anyhow::{ensure, Result};
use futures::future;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::tmdb::{MovieSummary, TmdbApi, TmdbError};

/// Build the candidate pool: `pages` pages of the top-rated listing, each
/// movie enriched with director and IMDB id, deduplicated by TMDB id and
/// uniformly shuffled.
///
/// All enrichment lookups for one page run concurrently and are joined
/// before the next page is requested. A movie without a credited director is
/// skipped with a warning; any other error aborts the fetch and partial
/// results are discarded.
pub async fn fetch_pool(api: &dyn TmdbApi, pages: u32) -> Result<Vec<MovieSummary>> {
    ensure!(pages >= 1, "page count must be at least 1 (got {pages})");

    let mut seen = HashSet::new();
    let mut pool = Vec::new();
    for page in 1..=pages {
        let listed = api.top_rated_page(page).await?;
        let enriched = future::join_all(listed.into_iter().map(|m| api.enrich_movie(m))).await;
        for result in enriched {
            match result {
                Ok(movie) => {
                    if seen.insert(movie.id) {
                        pool.push(movie);
                    }
                }
                Err(TmdbError::MissingDirector { id, title }) => {
                    warn!(id, %title, "Skipping movie without a credited director");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pool.shuffle(&mut rand::thread_rng());
    info!(movies = pool.len(), pages, "Built movie pool");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmdb::ListedMovie;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeTmdb {
        pages: Vec<Vec<ListedMovie>>,
        directors: HashMap<i32, String>,
    }

    #[async_trait]
    impl TmdbApi for FakeTmdb {
        async fn top_rated_page(&self, page: u32) -> Result<Vec<ListedMovie>, TmdbError> {
            Ok(self.pages[(page - 1) as usize].clone())
        }

        async fn enrich_movie(&self, listed: ListedMovie) -> Result<MovieSummary, TmdbError> {
            let director = self.directors.get(&listed.id).cloned().ok_or_else(|| {
                TmdbError::MissingDirector {
                    id: listed.id,
                    title: listed.title.clone(),
                }
            })?;
            Ok(MovieSummary {
                id: listed.id,
                title: listed.title,
                poster_path: listed.poster_path,
                vote_average: listed.vote_average,
                release_date: listed.release_date,
                director,
                imdb_id: None,
            })
        }
    }

    struct BrokenListing;

    #[async_trait]
    impl TmdbApi for BrokenListing {
        async fn top_rated_page(&self, _page: u32) -> Result<Vec<ListedMovie>, TmdbError> {
            Err(TmdbError::Status {
                url: "https://api.themoviedb.org/3/movie/top_rated".to_string(),
                status: reqwest::StatusCode::UNAUTHORIZED,
                body: "invalid api key".to_string(),
            })
        }

        async fn enrich_movie(&self, _listed: ListedMovie) -> Result<MovieSummary, TmdbError> {
            unreachable!("listing already failed")
        }
    }

    fn listed(id: i32) -> ListedMovie {
        ListedMovie {
            id,
            title: format!("Movie {id}"),
            poster_path: None,
            vote_average: 7.0,
            release_date: "2001-01-01".to_string(),
        }
    }

    fn fake(pages: Vec<Vec<ListedMovie>>) -> FakeTmdb {
        let directors = pages
            .iter()
            .flatten()
            .map(|m| (m.id, format!("Director {}", m.id)))
            .collect();
        FakeTmdb { pages, directors }
    }

    #[tokio::test]
    async fn deduplicates_across_pages() {
        let api = fake(vec![
            vec![listed(1), listed(2), listed(2)],
            vec![listed(2), listed(3)],
        ]);
        let pool = fetch_pool(&api, 2).await.unwrap();

        let mut ids: Vec<i32> = pool.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn shuffle_is_a_permutation_of_the_input() {
        let input: Vec<ListedMovie> = (1..=50).map(listed).collect();
        let api = fake(vec![input]);
        let pool = fetch_pool(&api, 1).await.unwrap();

        let mut ids: Vec<i32> = pool.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=50).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn skips_movies_without_a_director() {
        let mut api = fake(vec![vec![listed(1), listed(2), listed(3)]]);
        api.directors.remove(&2);
        let pool = fetch_pool(&api, 1).await.unwrap();

        let mut ids: Vec<i32> = pool.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn listing_failure_aborts_the_fetch() {
        let err = fetch_pool(&BrokenListing, 1).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn rejects_zero_pages() {
        let api = fake(vec![]);
        assert!(fetch_pool(&api, 0).await.is_err());
    }
}

use crate::pool;
use crate::quiz::{Feedback, GuessMode, QuizState};
use crate::tmdb::{TmdbApi, TmdbClient};
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{env, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const MAX_BODY_BYTES: usize = 16 * 1024;
const QUIZ_SIZE: usize = 20;
const DEFAULT_POOL_PAGES: u32 = 1;
const FEEDBACK_TTL: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub quiz: Arc<Mutex<QuizState>>,
    // Pending feedback-clear task; replaced (old one aborted) on every guess.
    pub clear_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    pub feedback_ttl: Duration,
}

impl AppState {
    pub fn new(quiz: QuizState, feedback_ttl: Duration) -> Self {
        Self {
            quiz: Arc::new(Mutex::new(quiz)),
            clear_task: Arc::new(Mutex::new(None)),
            feedback_ttl,
        }
    }
}

pub async fn run_server() -> Result<()> {
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::from_env()?);
    let pages = env::var("POOL_PAGES")
        .ok()
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(DEFAULT_POOL_PAGES);

    let mut movies = pool::fetch_pool(tmdb.as_ref(), pages).await?;
    movies.truncate(QUIZ_SIZE);
    info!(questions = movies.len(), "Quiz ready");

    let state = AppState::new(QuizState::new(movies), FEEDBACK_TTL);
    let app = build_router(state);

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3146);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/state", get(quiz_state))
        .route("/api/v1/guess", post(submit_guess))
        .route("/api/v1/mode", post(set_mode))
        .route("/api/v1/restart", post(restart))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "OK"
}

/// What the presentation layer sees. Answer-bearing fields (director,
/// release date) stay server-side.
#[derive(Serialize)]
struct StateOut {
    question: Option<QuestionOut>,
    index: usize,
    total: usize,
    score: u32,
    mode: GuessMode,
    feedback: Option<Feedback>,
    finished: bool,
}

#[derive(Serialize)]
struct QuestionOut {
    title: String,
    poster_url: Option<String>,
    vote_average: f32,
    imdb_url: Option<String>,
}

#[derive(Deserialize)]
struct GuessIn {
    guess: String,
}

#[derive(Serialize)]
struct GuessOut {
    correct: bool,
    feedback: String,
    score: u32,
    index: usize,
    finished: bool,
}

#[derive(Deserialize)]
struct ModeIn {
    mode: GuessMode,
}

fn state_view(quiz: &QuizState) -> StateOut {
    StateOut {
        question: quiz.current_movie().map(|m| QuestionOut {
            title: m.title.clone(),
            poster_url: m.poster_url(),
            vote_average: m.vote_average,
            imdb_url: m.imdb_url(),
        }),
        index: quiz.index(),
        total: quiz.total(),
        score: quiz.score(),
        mode: quiz.mode(),
        feedback: quiz.feedback().cloned(),
        finished: quiz.is_finished(),
    }
}

async fn quiz_state(State(state): State<AppState>) -> Json<StateOut> {
    let quiz = state.quiz.lock().await;
    Json(state_view(&quiz))
}

async fn submit_guess(State(state): State<AppState>, Json(body): Json<GuessIn>) -> Response {
    let mut quiz = state.quiz.lock().await;
    match quiz.submit_guess(&body.guess) {
        None => conflict("quiz is finished"),
        Some(feedback) => {
            let out = GuessOut {
                correct: feedback.correct,
                feedback: feedback.text,
                score: quiz.score(),
                index: quiz.index(),
                finished: quiz.is_finished(),
            };
            // Rescheduled while the quiz lock is held, so the previous timer
            // cannot fire between the new feedback and its new clear task.
            schedule_feedback_clear(&state).await;
            Json(out).into_response()
        }
    }
}

async fn set_mode(State(state): State<AppState>, Json(body): Json<ModeIn>) -> Response {
    let mut quiz = state.quiz.lock().await;
    if quiz.set_mode(body.mode) {
        Json(state_view(&quiz)).into_response()
    } else {
        conflict("quiz is finished")
    }
}

async fn restart(State(state): State<AppState>) -> Response {
    let mut quiz = state.quiz.lock().await;
    if quiz.restart() {
        let mut slot = state.clear_task.lock().await;
        if let Some(old) = slot.take() {
            old.abort();
        }
        Json(state_view(&quiz)).into_response()
    } else {
        conflict("quiz is still in progress")
    }
}

/// Replace the pending feedback-clear task with a fresh one. A stale task
/// must never clear a newer message, so the old one is always aborted first.
async fn schedule_feedback_clear(state: &AppState) {
    let mut slot = state.clear_task.lock().await;
    if let Some(old) = slot.take() {
        old.abort();
    }
    let quiz = state.quiz.clone();
    let ttl = state.feedback_ttl;
    *slot = Some(tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        quiz.lock().await.clear_feedback();
    }));
}

fn conflict(message: &str) -> Response {
    (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}

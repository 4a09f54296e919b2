use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::db::{Database, Edition, EditionSource};
use crate::render::RenderedEmail;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 200;

/// Digest rendered for the current preview session.
pub struct Preview {
    pub edition: i64,
    pub email: RenderedEmail,
}

pub struct AppState {
    pub db: Arc<Database>,
    pub preview: Preview,
}

// Template structs
#[derive(Template)]
#[template(path = "history.html")]
pub struct HistoryTemplate {
    pub preview_edition: i64,
    pub editions: Vec<EditionWithSources>,
}

pub struct EditionWithSources {
    pub edition: Edition,
    pub sources: Vec<EditionSource>,
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(preview_html))
        .route("/digest.txt", get(preview_text))
        .route("/history", get(history))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Route handlers
pub async fn preview_html(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Html(state.preview.email.html.clone())
}

pub async fn preview_text(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.preview.email.text.clone(),
    )
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    DEFAULT_HISTORY_LIMIT
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.clamp(1, MAX_HISTORY_LIMIT);
    let editions = state.db.recent_editions(limit).await?;

    let mut with_sources = Vec::with_capacity(editions.len());
    for edition in editions {
        let sources = state.db.sources_for_edition(edition.edition).await?;
        with_sources.push(EditionWithSources { edition, sources });
    }

    Ok(HtmlTemplate(HistoryTemplate {
        preview_edition: state.preview.edition,
        editions: with_sources,
    }))
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

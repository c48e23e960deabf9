//! Single-page web form
//!
//! `GET /` shows the form, `POST /` runs one summarize request and renders
//! the outcome on the same page.

use std::sync::Arc;

use axum::{
    Form, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use html_escape::{encode_double_quoted_attribute, encode_text};
use log::info;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::pipeline::{Failure, Pipeline};
use crate::summarize::ChatModel;
use crate::youtube::CaptionFetcher;
use crate::{SummaryResult, VideoRequest};

const TITLE: &str = "Summarize a YouTube video";

/// Shared server state. The lock keeps at most one request in flight.
pub struct AppState<F, M> {
    pipeline: Mutex<Pipeline<F, M>>,
}

impl<F, M> AppState<F, M> {
    pub fn new(pipeline: Pipeline<F, M>) -> Self {
        Self {
            pipeline: Mutex::new(pipeline),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SummarizeForm {
    #[serde(default)]
    pub url: String,
}

/// What the page shows under the form
#[derive(Debug)]
pub enum Outcome {
    Idle,
    Summary(SummaryResult),
    Invalid(String),
    Failed(Failure),
}

impl Outcome {
    fn status(&self) -> StatusCode {
        match self {
            Outcome::Idle | Outcome::Summary(_) => StatusCode::OK,
            Outcome::Invalid(_) => StatusCode::BAD_REQUEST,
            Outcome::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn create_router<F, M>(state: Arc<AppState<F, M>>) -> Router
where
    F: CaptionFetcher + Send + Sync + 'static,
    M: ChatModel + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(form_page).post(summarize::<F, M>))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn form_page() -> Html<String> {
    Html(render_page("", &Outcome::Idle))
}

async fn summarize<F, M>(State(state): State<Arc<AppState<F, M>>>, Form(form): Form<SummarizeForm>) -> Response
where
    F: CaptionFetcher + Send + Sync + 'static,
    M: ChatModel + Send + Sync + 'static,
{
    let request = VideoRequest { url: form.url };
    let pipeline = state.pipeline.lock().await;
    info!("Summarize request: {}", request.url);

    let outcome = match pipeline.run(&request).await {
        Ok(summary) => Outcome::Summary(summary),
        Err(failure) if failure.error.is_validation() => Outcome::Invalid(failure.error.to_string()),
        Err(failure) => Outcome::Failed(failure),
    };
    drop(pipeline);

    (outcome.status(), Html(render_page(&request.url, &outcome))).into_response()
}

/// Render the whole page with `url` pre-filled
pub fn render_page(url: &str, outcome: &Outcome) -> String {
    let result = match outcome {
        Outcome::Idle => String::new(),
        Outcome::Summary(summary) => format!(
            "<section class=\"success\"><h2>Summary</h2><p>{}</p></section>",
            encode_text(&summary.text).replace('\n', "<br>")
        ),
        Outcome::Invalid(message) => format!("<p class=\"error\">{}</p>", encode_text(message)),
        Outcome::Failed(failure) => {
            let chain: String = failure
                .error
                .chain()
                .iter()
                .map(|line| format!("<li>{}</li>", encode_text(line)))
                .collect();
            format!(
                "<section class=\"exception\"><h2>Error while {}</h2><ul>{chain}</ul></section>",
                failure.stage
            )
        }
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{TITLE}</title>
<style>
body {{ font-family: sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }}
input[type=url], input[type=text] {{ width: 100%; padding: .5rem; }}
.success {{ background: #e8f5e9; padding: 1rem; }}
.error {{ background: #fff3e0; padding: 1rem; }}
.exception {{ background: #ffebee; padding: 1rem; font-family: monospace; }}
</style>
</head>
<body>
<h1>{TITLE}</h1>
<form method="post" action="/">
<input type="text" name="url" aria-label="URL" placeholder="https://www.youtube.com/watch?v=..." value="{url}">
<button type="submit">Summarize</button>
</form>
{result}
</body>
</html>
"#,
        url = encode_double_quoted_attribute(url),
    )
}

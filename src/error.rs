use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// User-correctable input problems, checked before any external call
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please provide the information to get started")]
    MissingInput,

    #[error("Please enter a valid URL. It can be a YouTube video URL")]
    InvalidUrl(String),

    #[error("Please enter a valid YouTube URL")]
    UnsupportedHost(String),
}

/// Caption file could not be read as text
#[derive(Debug, Error)]
#[error("could not read caption file {}", path.display())]
pub struct ParseError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("could not create a working directory for subtitles")]
    TempDir(#[source] std::io::Error),

    #[error("yt-dlp not found at '{0}'. Install it with: pip install yt-dlp")]
    ToolMissing(String),

    #[error("failed to run yt-dlp")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to fetch subtitles using yt-dlp ({status}){}", stderr_suffix(.stderr))]
    FetchFailed { status: ExitStatus, stderr: String },

    #[error("could not list the subtitle working directory")]
    Scan(#[source] std::io::Error),

    #[error("could not remove the subtitle working directory")]
    Cleanup(#[source] std::io::Error),

    #[error("yt-dlp did not finish within {0:?}")]
    Timeout(Duration),

    #[error("No subtitles available for this video")]
    NoSubtitles,

    #[error("subtitle fetch task did not complete")]
    Interrupted(#[source] tokio::task::JoinError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("request to the summarization API failed")]
    Http(#[from] reqwest::Error),

    #[error("summarization API returned {status}: {body}")]
    Api { status: reqwest::StatusCode, body: String },

    #[error("unexpected summarization API response format")]
    UnexpectedResponse,

    #[error("prompt template must contain the {{text}} placeholder")]
    Template,
}

/// Every way a single summarize request can end without a summary
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Acquisition(AcquisitionError),

    #[error(transparent)]
    Parse(ParseError),

    #[error(transparent)]
    Summarization(#[from] SummarizationError),
}

impl From<AcquisitionError> for Error {
    fn from(err: AcquisitionError) -> Self {
        match err {
            AcquisitionError::Parse(e) => Error::Parse(e),
            other => Error::Acquisition(other),
        }
    }
}

impl Error {
    /// Validation failures are shown inline without diagnostic detail
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Display string of this error followed by each of its sources
    pub fn chain(&self) -> Vec<String> {
        let mut out = vec![self.to_string()];
        let mut source = self.source();
        while let Some(err) = source {
            let msg = err.to_string();
            if out.last() != Some(&msg) {
                out.push(msg);
            }
            source = err.source();
        }
        out
    }
}

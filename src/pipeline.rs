//! Request orchestration: validate, acquire, extract, summarize.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use url::Url;

use crate::config::Settings;
use crate::error::{AcquisitionError, Error, ValidationError};
use crate::summarize::{ChatClient, ChatModel, MapReduce, PromptTemplate};
use crate::youtube::{Acquirer, CaptionFetcher, YtDlp};
use crate::{SummaryResult, TranscriptDocument, VideoRequest, is_supported_host};

/// Where a request is, or where it stopped
///
/// Caption text is extracted inside `Acquirer::acquire`, so a request only
/// enters `Extracting` after that call returns; parse failures are still
/// reported against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Validating,
    Acquiring,
    Extracting,
    Summarizing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Validating => "validating",
            Stage::Acquiring => "acquiring",
            Stage::Extracting => "extracting",
            Stage::Summarizing => "summarizing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A request that ended without a summary, and the stage it was in
#[derive(Debug)]
pub struct Failure {
    pub stage: Stage,
    pub error: Error,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (while {})", self.error, self.stage)
    }
}

impl std::error::Error for Failure {
    // the message already includes `error`, so continue with its cause
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

/// Runs one summarize request at a time, start to finish
pub struct Pipeline<F, M> {
    api_key: Option<String>,
    acquirer: Arc<Acquirer<F>>,
    chain: MapReduce<M>,
}

impl Pipeline<YtDlp, ChatClient> {
    /// Production wiring: yt-dlp for captions, the configured chat endpoint for summaries.
    ///
    /// A missing API key is not an error here; each request reports it instead.
    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        let fetcher = YtDlp::new(settings.yt_dlp.clone(), settings.fetch_timeout);
        let client = ChatClient::new(
            settings.api_base.clone(),
            settings.api_key.clone().unwrap_or_default(),
            settings.model.clone(),
            settings.request_timeout,
        )?;
        let prompt = PromptTemplate::new(settings.prompt.clone())?;
        Ok(Self::new(
            settings.api_key.clone(),
            Acquirer::new(fetcher),
            MapReduce::new(client, prompt, settings.chunk_chars, settings.token_max_chars),
        ))
    }
}

impl<F, M> Pipeline<F, M>
where
    F: CaptionFetcher + Send + Sync + 'static,
    M: ChatModel + Sync,
{
    pub fn new(api_key: Option<String>, acquirer: Acquirer<F>, chain: MapReduce<M>) -> Self {
        Self {
            api_key,
            acquirer: Arc::new(acquirer),
            chain,
        }
    }

    pub fn acquirer(&self) -> &Acquirer<F> {
        &self.acquirer
    }

    pub fn chain(&self) -> &MapReduce<M> {
        &self.chain
    }

    /// Check credential and URL without touching the network
    pub fn validate(&self, request: &VideoRequest) -> Result<Url, ValidationError> {
        let url = request.url.trim();
        let has_key = self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if !has_key || url.is_empty() {
            return Err(ValidationError::MissingInput);
        }

        let parsed = parse_url(url).ok_or_else(|| ValidationError::InvalidUrl(url.to_string()))?;
        if !is_supported_host(&parsed) {
            return Err(ValidationError::UnsupportedHost(url.to_string()));
        }
        Ok(parsed)
    }

    pub async fn run(&self, request: &VideoRequest) -> Result<SummaryResult, Failure> {
        let mut stage = Stage::Idle;
        let result = self.run_stages(request, &mut stage).await;
        match result {
            Ok(summary) => {
                advance(&mut stage, Stage::Done);
                Ok(summary)
            }
            Err(error) => {
                warn!("Request for {} failed while {stage}: {error}", request.url);
                Err(Failure { stage, error })
            }
        }
    }

    async fn run_stages(&self, request: &VideoRequest, stage: &mut Stage) -> Result<SummaryResult, Error> {
        advance(stage, Stage::Validating);
        let url = self.validate(request)?;

        advance(stage, Stage::Acquiring);
        let transcript = self.acquire(url).await.map_err(|e| {
            let err = Error::from(e);
            if matches!(err, Error::Parse(_)) {
                *stage = Stage::Extracting;
            }
            err
        })?;
        advance(stage, Stage::Extracting);
        info!(
            "Transcript for {} has {} chars",
            transcript.video_id.as_deref().unwrap_or("unknown video"),
            transcript.text.len()
        );

        advance(stage, Stage::Summarizing);
        let text = self.summarize(transcript.clone()).await?;

        Ok(SummaryResult {
            video_id: transcript.video_id,
            text,
        })
    }

    /// Fetch and extract on the blocking pool
    async fn acquire(&self, url: Url) -> Result<TranscriptDocument, AcquisitionError> {
        let acquirer = Arc::clone(&self.acquirer);
        tokio::task::spawn_blocking(move || acquirer.acquire(url.as_str()))
            .await
            .map_err(AcquisitionError::Interrupted)?
    }

    async fn summarize(&self, transcript: TranscriptDocument) -> Result<String, Error> {
        Ok(self.chain.summarize(&[transcript]).await?)
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("stage: {stage} -> {next}");
    *stage = next;
}

/// Absolute http(s) URL with a host
fn parse_url(input: &str) -> Option<Url> {
    let url = Url::parse(input).ok()?;
    let is_web = matches!(url.scheme(), "http" | "https");
    let has_host = url.host_str().is_some_and(|h| !h.is_empty());
    (is_web && has_host).then_some(url)
}

pub mod config;
pub mod error;
pub mod pipeline;
pub mod summarize;
pub mod vtt;
pub mod web;
pub mod youtube;

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// A summarize request as submitted by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub url: String,
}

/// Flattened caption text for one video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptDocument {
    pub video_id: Option<String>,
    pub text: String,
}

/// Model-generated summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryResult {
    pub video_id: Option<String>,
    pub text: String,
}

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"youtube\.com/watch\?.*v=([a-zA-Z0-9_-]{11})",
        r"youtu\.be/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/embed/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/live/([a-zA-Z0-9_-]{11})",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Extract the video ID from the common YouTube URL shapes
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(input))
        .map(|caps| caps[1].to_string())
}

/// Hosts we know how to fetch subtitles from
pub fn is_supported_host(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    host == "youtube.com" || host == "youtu.be" || host.ends_with(".youtube.com")
}

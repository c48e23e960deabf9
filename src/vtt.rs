use std::path::Path;

use log::debug;

use crate::error::ParseError;

const TIMING_SEPARATOR: &str = "-->";
const HEADER_KEYWORD: &str = "WEBVTT";
const COMMENT_KEYWORD: &str = "NOTE";

/// Read a WebVTT file and flatten its cue text into one line
pub fn extract(path: &Path) -> Result<String, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError {
        path: path.to_path_buf(),
        source,
    })?;
    let text = extract_text(&content);
    debug!("Extracted {} chars of caption text from {}", text.len(), path.display());
    Ok(text)
}

/// Keep cue text lines in order, joined by single spaces.
///
/// Only whole lines are filtered: cue identifiers and inline markup such as
/// `<c>` or `<v Speaker>` survive verbatim.
pub fn extract_text(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| is_cue_text(line))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_cue_text(line: &str) -> bool {
    !line.is_empty()
        && !line.contains(TIMING_SEPARATOR)
        && !line.starts_with(HEADER_KEYWORD)
        && !line.starts_with(COMMENT_KEYWORD)
}

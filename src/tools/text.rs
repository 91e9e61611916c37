//! Pure text tools: video id extraction, truncation and URL normalization.

use crate::error::{Result, YtAgentError};
use regex::Regex;
use std::sync::LazyLock;

/// Matches the 11-character id after `v=`, `youtu.be/` or `embed/`.
static VIDEO_ID_IN_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:v=|be/|embed/)([a-zA-Z0-9_-]{11})").expect("Invalid regex")
});

static BARE_VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("Invalid regex"));

/// Extract the 11-character YouTube video id from a watch, youtu.be or embed URL.
pub fn extract_video_id(url: &str) -> Result<String> {
    VIDEO_ID_IN_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| YtAgentError::tool("extract_video_id", "Invalid YouTube URL"))
}

/// Truncate `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Turn a video URL or bare id into a URL yt-dlp accepts.
pub fn normalize_video_url(input: &str) -> Result<String> {
    let input = input.trim();

    if BARE_VIDEO_ID.is_match(input) {
        return Ok(format!("https://www.youtube.com/watch?v={}", input));
    }

    let parsed = url::Url::parse(input)
        .map_err(|e| YtAgentError::InvalidInput(format!("Invalid video URL '{}': {}", input, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(YtAgentError::InvalidInput(format!(
            "Unsupported URL scheme '{}' in {}",
            other, input
        ))),
    }
}

/// Validate and upper-case a two-letter region code.
pub fn normalize_region_code(region_code: &str) -> Result<String> {
    let code = region_code.trim();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(YtAgentError::InvalidInput(format!(
            "Region code must be two letters (e.g. US), got '{}'",
            region_code
        )))
    }
}

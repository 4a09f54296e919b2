//! Cleanup for raw social-feed items before they reach the recency merge.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]+src="([^"]+)""#).expect("static regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Decorative image markers that never count as post media.
const ICON_MARKERS: &[&str] = &["emoji", "twemoji"];

const REPOST_MARKER: &str = "RT by ";
const REPLY_MARKER: &str = "R to ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PostKind {
    #[default]
    Original,
    Repost,
    Reply,
}

/// Strip a leading "RT by <who>: " or "R to <who>: " marker.
///
/// Returns the remaining text and which kind of post it was. Text without a
/// marker is returned unchanged apart from whitespace collapsing.
pub fn strip_repost_marker(text: &str) -> (String, PostKind) {
    let kind = if text.starts_with(REPOST_MARKER) {
        PostKind::Repost
    } else if text.starts_with(REPLY_MARKER) {
        PostKind::Reply
    } else {
        PostKind::Original
    };

    let body = match kind {
        PostKind::Original => text,
        PostKind::Repost | PostKind::Reply => match text.find(": ") {
            Some(idx) => &text[idx + 2..],
            None => text,
        },
    };

    (collapse_whitespace(body), kind)
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Pull `<img src>` URLs out of an HTML fragment, skipping emoji glyphs.
pub fn extract_images(html: &str) -> Vec<String> {
    IMG_SRC
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|src| !ICON_MARKERS.iter().any(|marker| src.contains(marker)))
        .map(str::to_string)
        .collect()
}

pub fn avatar_url(handle: &str) -> String {
    format!("https://unavatar.io/twitter/{}", handle.trim_start_matches('@'))
}

const FEED_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Parse a feed timestamp.
///
/// Accepts RFC 2822 (numeric offsets or named zones such as `GMT`), RFC 3339,
/// and `%a, %d %b %Y %H:%M:%S %z`. Returns `None` for anything else and for
/// zero timestamps, so undated items fall out of time windows.
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .or_else(|_| DateTime::parse_from_str(raw, FEED_DATE_FORMAT))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()?;

    (parsed.timestamp() > 0).then_some(parsed)
}

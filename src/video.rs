use std::sync::LazyLock;

use regex::Regex;

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([^&?#]+)").expect("static regex")
});

/// Pull the YouTube video id out of a watch or short link.
///
/// Anything unrecognised yields an empty id; lessons are still created.
pub fn extract_video_id(url: &str) -> String {
    VIDEO_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

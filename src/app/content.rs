use url::Url;

use crate::domain::post::VideoService;

pub const MAX_TEXT_CHARS: usize = 1500;
const DEFAULT_LINK_TITLE: &str = "Untitled";

/// Trims a status text and checks it is between 1 and 1500 characters.
pub fn status_text(raw: &str) -> Option<String> {
    let text = raw.trim();
    let len = text.chars().count();
    (len > 0 && len <= MAX_TEXT_CHARS).then(|| text.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextTooLong;

/// Optional free text attached to video, link and photo posts. Blank input
/// becomes `None`.
pub fn optional_text(raw: Option<&str>) -> Result<Option<String>, TextTooLong> {
    let Some(text) = raw.map(str::trim).filter(|text| !text.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(TextTooLong);
    }
    Ok(Some(text.to_string()))
}

/// Extracts the provider and video id from a YouTube or Vimeo URL.
pub fn parse_video_url(raw: &str) -> Option<(VideoService, String)> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    match host {
        "youtube.com" => {
            if url.path() != "/watch" {
                return None;
            }
            let id = url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned())?;
            is_youtube_id(&id).then_some((VideoService::Youtube, id))
        }
        "youtu.be" => {
            let id = url.path_segments()?.next()?.to_string();
            is_youtube_id(&id).then_some((VideoService::Youtube, id))
        }
        "vimeo.com" => {
            let id = url.path_segments()?.next()?.to_string();
            let numeric = !id.is_empty() && id.chars().all(|c| c.is_ascii_digit());
            numeric.then_some((VideoService::Vimeo, id))
        }
        _ => None,
    }
}

fn is_youtube_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Normalizes a link for a link post. Only absolute http(s) URLs whose
/// host contains a dot are accepted.
pub fn link_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    if !host.contains('.') || host.starts_with('.') || host.ends_with('.') {
        return None;
    }
    Some(url.to_string())
}

pub fn link_title(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|title| !title.is_empty())
        .map(|title| title.chars().take(MAX_TEXT_CHARS).collect())
        .unwrap_or_else(|| DEFAULT_LINK_TITLE.to_string())
}

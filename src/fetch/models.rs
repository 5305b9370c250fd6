//! Payloads exchanged with oEmbed and the download provider

use serde::{Deserialize, Serialize};

use super::MediaKind;

const UNKNOWN: &str = "Unknown";

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// The parts of an oEmbed response we care about
#[derive(Debug, Clone, Deserialize)]
pub struct OEmbed {
    #[serde(default = "unknown")]
    pub title: String,
    #[serde(default = "unknown")]
    pub author_name: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Body of the `/info` endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub title: String,
    pub author: String,
    pub thumbnail: Option<String>,
    /// oEmbed has no duration, so this is always "Unknown"
    pub duration: String,
}

impl MediaInfo {
    pub fn new(kind: MediaKind, oembed: OEmbed) -> Self {
        Self {
            kind,
            title: oembed.title,
            author: oembed.author_name,
            thumbnail: oembed.thumbnail_url,
            duration: unknown(),
        }
    }
}

/// Body posted to the provider's download endpoint
#[derive(Debug, Serialize)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
}

/// Response of the provider's playlist endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistListing {
    #[serde(default)]
    pub tracks: Vec<PlaylistTrack>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistTrack {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl PlaylistTrack {
    /// Title to name the track by, falling back to its 1-based position
    pub fn title_or(&self, position: usize) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => title.clone(),
            _ => format!("Track {}", position),
        }
    }
}

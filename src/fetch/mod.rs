//! Fetching tracks and playlists from the upstream provider.
//!
//! A request goes through three steps:
//!
//! - Resolve metadata (title, author, thumbnail) through oEmbed
//! - Download the audio through a cookie-bearing provider session
//! - Materialize it as a single temporary file (an mp3, or a zip for playlists)
//!

use serde::Serialize;
use thiserror::Error;

pub mod materialize;
pub mod models;
pub mod oembed;
pub mod provider;

pub use materialize::{Materialized, materialize_playlist, materialize_track};
pub use oembed::resolve_metadata;
pub use provider::ProviderSession;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The metadata endpoint did not recognize the URL
    #[error("Invalid Spotify URL")]
    InvalidInput,

    #[error("Metadata lookup failed: {0}")]
    Metadata(#[source] reqwest::Error),

    #[error("Download failed with status {0}")]
    DownloadFailed(reqwest::StatusCode),

    #[error("Playlist fetch failed with status {0}")]
    PlaylistFetchFailed(reqwest::StatusCode),

    #[error("No tracks found")]
    NoTracks,

    // Transport errors while talking to the provider
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid provider URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    ZipError(#[from] async_zip::error::ZipError),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// What a Spotify URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Track,
    Playlist,
}

impl MediaKind {
    /// Anything mentioning "playlist" (in any case) is a playlist, the rest are tracks
    pub fn classify(url: &str) -> Self {
        if url.to_lowercase().contains("playlist") {
            Self::Playlist
        } else {
            Self::Track
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Track => "audio/mpeg",
            Self::Playlist => "application/zip",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Track => ".mp3",
            Self::Playlist => ".zip",
        }
    }
}

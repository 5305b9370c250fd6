//! Session with the download provider
//!
//! The provider only answers requests that look like they come from its own web
//! page, so every call carries browser-like headers and the cookies handed out by
//! the landing page. A session lives for a single incoming request.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{
    Client, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{debug, info, instrument, trace};

use super::{
    FetchError, Result,
    models::{DownloadRequest, PlaylistListing},
};
use crate::config::ProviderConfig;

const USER_AGENT: &str = "Mozilla/5.0";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Longest the provider may go quiet, either before answering or mid-body
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const CHUNK_SIZE: usize = 8192;

pub struct ProviderSession {
    client: Client,
    config: ProviderConfig,
    /// Referer, Origin and Content-Type sent with every API call
    browser_headers: HeaderMap,
}

impl ProviderSession {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Self::with_read_timeout(config, READ_TIMEOUT)
    }

    pub fn with_read_timeout(config: ProviderConfig, read_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .build()?;

        let mut browser_headers = HeaderMap::new();
        browser_headers.insert(header::REFERER, HeaderValue::from_str(&config.referer())?);
        browser_headers.insert(header::ORIGIN, HeaderValue::from_str(&config.origin())?);
        browser_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        Ok(Self {
            client,
            config,
            browser_headers,
        })
    }

    /// Visit the landing page so the provider hands out its session cookies.
    ///
    /// The outcome does not matter; a failure here shows up on the download itself.
    #[instrument(level = "debug", skip(self))]
    pub async fn warm_up(&self) {
        match self.client.get(self.config.landing_url()).send().await {
            Ok(response) => debug!(status = %response.status(), "Session established"),
            Err(e) => debug!(error = %e, "Landing page request failed"),
        }
    }

    /// Download the audio for `track_url` into `file`.
    ///
    /// Returns the number of bytes written.
    #[instrument(name = "download_track", level = "debug", skip(self, file))]
    pub async fn download_to(&self, track_url: &str, file: File) -> Result<u64> {
        let response = self
            .client
            .post(self.config.download_url()?)
            .headers(self.browser_headers.clone())
            .json(&DownloadRequest { url: track_url })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::DownloadFailed(response.status()));
        }

        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            writer.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            trace!(bytes = downloaded, chunk_size = chunk.len(), "Received chunk");
        }

        // Make sure the file is completely written
        writer.flush().await?;
        writer.into_inner().shutdown().await?;

        info!(bytes = downloaded, "Download completed");
        Ok(downloaded)
    }

    /// List the tracks of a playlist
    #[instrument(level = "debug", skip(self))]
    pub async fn playlist(&self, playlist_url: &str) -> Result<PlaylistListing> {
        let response = self
            .client
            .get(self.config.playlist_url()?)
            .query(&[("url", playlist_url)])
            .headers(self.browser_headers.clone())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::PlaylistFetchFailed(response.status()));
        }

        let listing = response.json::<PlaylistListing>().await?;
        debug!(tracks = listing.tracks.len(), "Fetched playlist listing");
        Ok(listing)
    }
}

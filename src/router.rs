use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::config::ProviderConfig;
use crate::fetch::{
    FetchError, Materialized, MediaKind, materialize_playlist, materialize_track,
    models::MediaInfo, resolve_metadata,
};
use crate::util::content_disposition;
use crate::workdir::WorkDir;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0:?}")]
    Other(#[from] color_eyre::Report),
}

impl Error {
    fn status_and_detail(&self) -> (StatusCode, &'static str) {
        match self {
            Error::Fetch(FetchError::InvalidInput) => {
                (StatusCode::BAD_REQUEST, "Invalid Spotify URL")
            }
            Error::Fetch(FetchError::Metadata(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Metadata lookup failed")
            }
            Error::Fetch(FetchError::DownloadFailed(_) | FetchError::RequestError(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Download failed")
            }
            Error::Fetch(FetchError::PlaylistFetchFailed(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Playlist fetch failed")
            }
            Error::Fetch(FetchError::NoTracks) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "No tracks found")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        let body = Json(ErrorResponse {
            detail: detail.to_string(),
        });
        (status, body).into_response()
    }
}

pub type AppRes<T> = Result<T, Error>;

#[derive(Clone)]
pub struct AppState {
    /// Shared client for metadata lookups; provider calls get their own session
    pub client: Client,
    pub provider: Arc<ProviderConfig>,
    pub workdir: WorkDir,
}

impl AppState {
    pub fn new(provider: ProviderConfig, workdir: WorkDir) -> color_eyre::Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            provider: Arc::new(provider),
            workdir,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SpotifyQuery {
    pub spotify_url: String,
}

#[tracing::instrument(skip(state))]
pub async fn info(
    State(state): State<AppState>,
    Query(query): Query<SpotifyQuery>,
) -> AppRes<Json<MediaInfo>> {
    let kind = MediaKind::classify(&query.spotify_url);
    let oembed = resolve_metadata(&state.client, &state.provider.oembed_url, &query.spotify_url)
        .await?;
    Ok(Json(MediaInfo::new(kind, oembed)))
}

#[tracing::instrument(skip(state))]
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<SpotifyQuery>,
) -> AppRes<Response> {
    let materialized = match MediaKind::classify(&query.spotify_url) {
        MediaKind::Track => {
            materialize_track(
                &state.client,
                &state.provider,
                &state.workdir,
                &query.spotify_url,
            )
            .await?
        }
        MediaKind::Playlist => {
            materialize_playlist(
                &state.client,
                &state.provider,
                &state.workdir,
                &query.spotify_url,
            )
            .await?
        }
    };

    stream_file(materialized).await
}

/// Stream a materialized file back to the caller.
///
/// The body takes ownership of the temp file guard, so the file is removed once
/// hyper is done with the body, whether it was sent in full or the client went away.
async fn stream_file(materialized: Materialized) -> AppRes<Response> {
    let content_type = materialized.content_type();
    let Materialized {
        file: guard,
        filename,
        ..
    } = materialized;

    let file = tokio::fs::File::open(guard.path()).await?;
    let length = file.metadata().await?.len();

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _owned = &guard;
        chunk
    });
    let body = Body::from_stream(stream);

    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&filename),
        )
        .body(body)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to build response: {}", e))?;

    Ok(response)
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/info", get(info))
        .route("/download", get(download))
        .fallback(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    detail: "Not Found".to_string(),
                }),
            )
        })
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

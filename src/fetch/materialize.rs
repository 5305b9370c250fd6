//! Turning a Spotify URL into a single file on disk

use std::collections::{HashMap, HashSet};

use async_zip::{Compression, ZipEntryBuilder, tokio::write::ZipFileWriter};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{debug, info, warn};

use super::{FetchError, MediaKind, ProviderSession, Result, resolve_metadata};
use crate::{
    config::ProviderConfig,
    util::sanitize_filename,
    workdir::{TempFile, WorkDir},
};

/// A downloaded file ready to be streamed back to the caller
#[derive(Debug)]
pub struct Materialized {
    pub file: TempFile,
    /// Name presented to the caller
    pub filename: String,
    pub kind: MediaKind,
}

impl Materialized {
    pub fn content_type(&self) -> &'static str {
        self.kind.content_type()
    }
}

#[tracing::instrument(skip(client, config, workdir))]
pub async fn materialize_track(
    client: &Client,
    config: &ProviderConfig,
    workdir: &WorkDir,
    spotify_url: &str,
) -> Result<Materialized> {
    let metadata = resolve_metadata(client, &config.oembed_url, spotify_url).await?;
    let filename = format!(
        "{}{}",
        sanitize_filename(&metadata.title),
        MediaKind::Track.extension()
    );

    let session = ProviderSession::new(config.clone())?;
    session.warm_up().await;

    let (file, handle) = workdir.create(MediaKind::Track.extension())?;
    session.download_to(spotify_url, handle).await?;

    info!(filename = %filename, "Track ready");
    Ok(Materialized {
        file,
        filename,
        kind: MediaKind::Track,
    })
}

/// Download every track of a playlist and bundle them into one zip archive.
///
/// Each track is written to its own temporary file, copied into the archive and
/// removed straight away. If anything fails the guards still held by this
/// future are dropped, which takes the archive and any pending track with them.
#[tracing::instrument(skip(client, config, workdir))]
pub async fn materialize_playlist(
    client: &Client,
    config: &ProviderConfig,
    workdir: &WorkDir,
    spotify_url: &str,
) -> Result<Materialized> {
    let metadata = resolve_metadata(client, &config.oembed_url, spotify_url).await?;
    let playlist_name = sanitize_filename(&metadata.title);

    let session = ProviderSession::new(config.clone())?;
    session.warm_up().await;

    let listing = session.playlist(spotify_url).await?;
    let total = listing.tracks.len();

    let tracks: Vec<(String, String)> = listing
        .tracks
        .into_iter()
        .enumerate()
        .filter_map(|(index, track)| {
            let title = track.title_or(index + 1);
            match track.url {
                Some(url) if !url.trim().is_empty() => Some((url, title)),
                _ => {
                    warn!(
                        position = index + 1,
                        title = %title,
                        "Skipping playlist entry without a URL"
                    );
                    None
                }
            }
        })
        .collect();

    if tracks.is_empty() {
        return Err(FetchError::NoTracks);
    }
    if tracks.len() < total {
        warn!(
            skipped = total - tracks.len(),
            total, "Some playlist entries could not be downloaded"
        );
    }

    let (archive, archive_handle) = workdir.create(MediaKind::Playlist.extension())?;
    let mut writer = ZipFileWriter::with_tokio(archive_handle);
    let mut names = EntryNames::default();

    for (index, (url, title)) in tracks.iter().enumerate() {
        let entry_name = names.claim(&format!(
            "{}{}",
            sanitize_filename(title),
            MediaKind::Track.extension()
        ));
        info!(
            entry = index + 1,
            total = tracks.len(),
            name = %entry_name,
            "Downloading playlist track"
        );

        let (track_file, handle) = workdir.create(MediaKind::Track.extension())?;
        session.download_to(url, handle).await?;

        let track = tokio::fs::File::open(track_file.path()).await?;
        let builder = ZipEntryBuilder::new(entry_name.into(), Compression::Stored);
        let mut entry = writer.write_entry_stream(builder).await?;
        futures_util::io::copy(track.compat(), &mut entry).await?;
        entry.close().await?;

        // Errors are already logged by the guard
        let _ = track_file.close();
    }

    let mut handle = writer.close().await?.into_inner();
    handle.flush().await?;
    handle.shutdown().await?;

    let filename = format!("{}{}", playlist_name, MediaKind::Playlist.extension());
    info!(filename = %filename, tracks = tracks.len(), "Playlist archive ready");

    Ok(Materialized {
        file: archive,
        filename,
        kind: MediaKind::Playlist,
    })
}

/// Hands out zip entry names, numbering repeats so no entry overwrites another
#[derive(Debug, Default)]
struct EntryNames {
    taken: HashSet<String>,
    /// Last number tried per requested name
    counters: HashMap<String, usize>,
}

impl EntryNames {
    fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }

        let (stem, ext) = match name.rfind('.') {
            Some(dot) => name.split_at(dot),
            None => (name, ""),
        };
        let counter = self.counters.entry(name.to_string()).or_insert(1);
        loop {
            *counter += 1;
            let renamed = format!("{} ({}){}", stem, counter, ext);
            if self.taken.insert(renamed.clone()) {
                debug!(original = %name, renamed = %renamed, "Renamed duplicate archive entry");
                return renamed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;

    use async_zip::tokio::read::seek::ZipFileReader;
    use url::Url;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TRACK_URL: &str = "https://open.spotify.com/track/2GzjIHQ87BF2zgbmmthZzO";
    const PLAYLIST_URL: &str = "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M";

    fn provider_config(server: &MockServer) -> ProviderConfig {
        let provider_url = Url::parse(&server.uri()).unwrap();
        ProviderConfig {
            oembed_url: provider_url.join("/oembed").unwrap(),
            provider_url,
        }
    }

    async fn mount_oembed(server: &MockServer, url: &str, title: &str) {
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .and(query_param("url", url))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": title,
                "author_name": "Someone",
                "thumbnail_url": "https://i.scdn.co/image/abc"
            })))
            .mount(server)
            .await;
    }

    async fn mount_track(server: &MockServer, url: &str, body: &[u8]) {
        Mock::given(method("POST"))
            .and(path("/api/download"))
            .and(body_json(serde_json::json!({ "url": url })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }

    async fn mount_playlist(server: &MockServer, tracks: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/playlist"))
            .and(query_param("url", PLAYLIST_URL))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "tracks": tracks })),
            )
            .mount(server)
            .await;
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    async fn zip_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        use tokio::io::AsyncReadExt;
        use tokio_util::compat::FuturesAsyncReadCompatExt;

        let bytes = std::fs::read(path).unwrap();
        let mut zip = ZipFileReader::with_tokio(Cursor::new(bytes)).await.unwrap();
        let count = zip.file().entries().len();

        let mut out = Vec::new();
        for index in 0..count {
            let name = zip.file().entries()[index]
                .filename()
                .as_str()
                .unwrap()
                .to_string();
            let mut reader = zip.reader_with_entry(index).await.unwrap().compat();
            let mut data = Vec::new();
            reader.read_to_end(&mut data).await.unwrap();
            out.push((name, data));
        }
        out
    }

    #[tokio::test]
    async fn test_materialize_track() {
        let server = MockServer::start().await;
        mount_oembed(&server, TRACK_URL, "Song Name").await;
        mount_track(&server, TRACK_URL, b"ID3 fake audio").await;

        let sandbox = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(sandbox.path()).unwrap();

        let materialized = materialize_track(
            &Client::new(),
            &provider_config(&server),
            &workdir,
            TRACK_URL,
        )
        .await
        .unwrap();

        assert_eq!(materialized.filename, "Song Name.mp3");
        assert_eq!(materialized.content_type(), "audio/mpeg");
        assert_eq!(
            std::fs::read(materialized.file.path()).unwrap(),
            b"ID3 fake audio"
        );

        drop(materialized);
        assert_eq!(entries(sandbox.path()), 0);
    }

    #[tokio::test]
    async fn test_materialize_track_sanitizes_title() {
        let server = MockServer::start().await;
        mount_oembed(&server, TRACK_URL, " What? / Why: ").await;
        mount_track(&server, TRACK_URL, b"audio").await;

        let sandbox = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(sandbox.path()).unwrap();

        let materialized = materialize_track(
            &Client::new(),
            &provider_config(&server),
            &workdir,
            TRACK_URL,
        )
        .await
        .unwrap();
        assert_eq!(materialized.filename, "What  Why.mp3");
    }

    #[tokio::test]
    async fn test_failed_track_download_leaves_nothing_behind() {
        let server = MockServer::start().await;
        mount_oembed(&server, TRACK_URL, "Song Name").await;
        Mock::given(method("POST"))
            .and(path("/api/download"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sandbox = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(sandbox.path()).unwrap();

        let result = materialize_track(
            &Client::new(),
            &provider_config(&server),
            &workdir,
            TRACK_URL,
        )
        .await;
        assert!(matches!(result, Err(FetchError::DownloadFailed(_))));
        assert_eq!(entries(sandbox.path()), 0);
    }

    #[tokio::test]
    async fn test_materialize_playlist() {
        let server = MockServer::start().await;
        mount_oembed(&server, PLAYLIST_URL, "My Mix").await;
        mount_playlist(
            &server,
            serde_json::json!([
                { "url": "https://open.spotify.com/track/a", "title": "First" },
                { "url": "https://open.spotify.com/track/b", "title": "Second" }
            ]),
        )
        .await;
        mount_track(&server, "https://open.spotify.com/track/a", b"first audio").await;
        mount_track(&server, "https://open.spotify.com/track/b", b"second audio").await;

        let sandbox = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(sandbox.path()).unwrap();

        let materialized = materialize_playlist(
            &Client::new(),
            &provider_config(&server),
            &workdir,
            PLAYLIST_URL,
        )
        .await
        .unwrap();

        assert_eq!(materialized.filename, "My Mix.zip");
        assert_eq!(materialized.content_type(), "application/zip");
        // Only the archive is left, per-track files are gone
        assert_eq!(entries(sandbox.path()), 1);

        let zipped = zip_entries(materialized.file.path()).await;
        assert_eq!(
            zipped,
            vec![
                ("First.mp3".to_string(), b"first audio".to_vec()),
                ("Second.mp3".to_string(), b"second audio".to_vec()),
            ]
        );

        drop(materialized);
        assert_eq!(entries(sandbox.path()), 0);
    }

    #[tokio::test]
    async fn test_playlist_without_tracks() {
        let server = MockServer::start().await;
        mount_oembed(&server, PLAYLIST_URL, "Empty").await;
        mount_playlist(&server, serde_json::json!([])).await;

        let sandbox = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(sandbox.path()).unwrap();

        let result = materialize_playlist(
            &Client::new(),
            &provider_config(&server),
            &workdir,
            PLAYLIST_URL,
        )
        .await;
        assert!(matches!(result, Err(FetchError::NoTracks)));
    }

    #[tokio::test]
    async fn test_playlist_skips_entries_without_url() {
        let server = MockServer::start().await;
        mount_oembed(&server, PLAYLIST_URL, "Mixed").await;
        mount_playlist(
            &server,
            serde_json::json!([
                { "title": "Missing" },
                { "url": "https://open.spotify.com/track/a" },
                { "url": "https://open.spotify.com/track/b", "title": "Dup" },
                { "url": "https://open.spotify.com/track/c", "title": "Dup" }
            ]),
        )
        .await;
        mount_track(&server, "https://open.spotify.com/track/a", b"a").await;
        mount_track(&server, "https://open.spotify.com/track/b", b"b").await;
        mount_track(&server, "https://open.spotify.com/track/c", b"c").await;

        let sandbox = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(sandbox.path()).unwrap();

        let materialized = materialize_playlist(
            &Client::new(),
            &provider_config(&server),
            &workdir,
            PLAYLIST_URL,
        )
        .await
        .unwrap();

        let names: Vec<String> = zip_entries(materialized.file.path())
            .await
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["Track 2.mp3", "Dup.mp3", "Dup (2).mp3"]);
    }

    #[tokio::test]
    async fn test_playlist_only_entries_without_url() {
        let server = MockServer::start().await;
        mount_oembed(&server, PLAYLIST_URL, "Broken").await;
        mount_playlist(&server, serde_json::json!([{ "title": "Nope" }])).await;

        let sandbox = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(sandbox.path()).unwrap();

        let result = materialize_playlist(
            &Client::new(),
            &provider_config(&server),
            &workdir,
            PLAYLIST_URL,
        )
        .await;
        assert!(matches!(result, Err(FetchError::NoTracks)));
    }

    #[tokio::test]
    async fn test_partial_playlist_failure_cleans_up() {
        let server = MockServer::start().await;
        mount_oembed(&server, PLAYLIST_URL, "My Mix").await;
        mount_playlist(
            &server,
            serde_json::json!([
                { "url": "https://open.spotify.com/track/a", "title": "First" },
                { "url": "https://open.spotify.com/track/b", "title": "Second" }
            ]),
        )
        .await;
        mount_track(&server, "https://open.spotify.com/track/a", b"first audio").await;
        Mock::given(method("POST"))
            .and(path("/api/download"))
            .and(body_json(
                serde_json::json!({ "url": "https://open.spotify.com/track/b" }),
            ))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let sandbox = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(sandbox.path()).unwrap();

        let result = materialize_playlist(
            &Client::new(),
            &provider_config(&server),
            &workdir,
            PLAYLIST_URL,
        )
        .await;
        assert!(matches!(result, Err(FetchError::DownloadFailed(_))));
        assert_eq!(entries(sandbox.path()), 0);
    }

    #[test]
    fn test_entry_names_dedupe() {
        let mut names = EntryNames::default();
        assert_eq!(names.claim("Song.mp3"), "Song.mp3");
        assert_eq!(names.claim("Song.mp3"), "Song (2).mp3");
        assert_eq!(names.claim("Song (2).mp3"), "Song (2) (2).mp3");
        assert_eq!(names.claim("Song.mp3"), "Song (3).mp3");
        assert_eq!(names.claim("noext"), "noext");
        assert_eq!(names.claim("noext"), "noext (2)");
    }

    #[test]
    fn test_entry_names_skip_names_already_taken() {
        let mut names = EntryNames::default();
        assert_eq!(names.claim("Song (2).mp3"), "Song (2).mp3");
        assert_eq!(names.claim("Song.mp3"), "Song.mp3");
        assert_eq!(names.claim("Song.mp3"), "Song (3).mp3");
        assert_eq!(names.claim("Song (3).mp3"), "Song (3) (2).mp3");
    }
}

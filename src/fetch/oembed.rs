use std::time::Duration;

use reqwest::{Client, StatusCode};
use url::Url;

use super::{FetchError, Result, models::OEmbed};

const METADATA_TIMEOUT: Duration = Duration::from_secs(15);

/// Looks up title, author and thumbnail for a Spotify URL.
///
/// Any non-200 answer means oEmbed does not know the URL, which is reported as
/// [`FetchError::InvalidInput`].
#[tracing::instrument(level = "debug", skip(client, endpoint), fields(endpoint = %endpoint))]
pub async fn resolve_metadata(
    client: &Client,
    endpoint: &Url,
    spotify_url: &str,
) -> Result<OEmbed> {
    let response = client
        .get(endpoint.clone())
        .query(&[("url", spotify_url)])
        .timeout(METADATA_TIMEOUT)
        .send()
        .await
        .map_err(FetchError::Metadata)?;

    if response.status() != StatusCode::OK {
        tracing::debug!(status = %response.status(), "oEmbed rejected URL");
        return Err(FetchError::InvalidInput);
    }

    let oembed = response
        .json::<OEmbed>()
        .await
        .map_err(FetchError::Metadata)?;
    tracing::trace!(title = %oembed.title, author = %oembed.author_name, "Resolved metadata");

    Ok(oembed)
}

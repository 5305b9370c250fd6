//! Config module for spotproxy

use std::path::PathBuf;

use clap::Parser;
use url::Url;

#[derive(Parser, Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the download provider
    #[clap(long, env = "SPX_PROVIDER_URL", default_value = "https://spotdown.org")]
    pub provider_url: Url,

    /// oEmbed endpoint used to look up track and playlist metadata
    #[clap(
        long,
        env = "SPX_OEMBED_URL",
        default_value = "https://open.spotify.com/oembed"
    )]
    pub oembed_url: Url,
}

impl ProviderConfig {
    /// Landing page visited to pick up session cookies
    pub fn landing_url(&self) -> Url {
        self.provider_url.clone()
    }

    pub fn download_url(&self) -> Result<Url, url::ParseError> {
        self.provider_url.join("/api/download")
    }

    pub fn playlist_url(&self) -> Result<Url, url::ParseError> {
        self.provider_url.join("/api/playlist")
    }

    /// `Origin` header value, without a trailing slash
    pub fn origin(&self) -> String {
        self.provider_url
            .as_str()
            .trim_end_matches('/')
            .to_string()
    }

    /// `Referer` header value, with a trailing slash
    pub fn referer(&self) -> String {
        format!("{}/", self.origin())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct Config {
    #[clap(long, env = "SPX_HOST", default_value = "0.0.0.0:8000")]
    pub host: String,

    /// Working directory for temporary downloads, every file in it is removed after use
    #[clap(long, env = "SPX_WORK_DIR", default_value = "/tmp/spotproxy")]
    pub work_dir: String,

    #[clap(flatten)]
    pub provider: ProviderConfig,
}

impl Config {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().into()
    }
}

pub fn config() -> Config {
    Config::parse()
}

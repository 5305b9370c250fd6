mod config;
mod fetch;
mod router;
mod util;
mod workdir;

use router::{AppState, create_router};
use workdir::WorkDir;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    color_eyre::install()?;

    let config = config::config();

    let workdir = WorkDir::new(config.work_dir())?;
    tracing::info!("Working directory: {}", workdir.root().display());
    tracing::info!(
        provider = %config.provider.provider_url,
        oembed = %config.provider.oembed_url,
        "Using upstream endpoints"
    );

    let state = AppState::new(config.provider.clone(), workdir)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.host).await?;
    tracing::info!("Listening on: {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

pub(crate) mod controllers;
pub mod core;
pub(crate) mod mcp;
pub mod routes;
pub(crate) mod token;
pub(crate) mod types;
pub mod utils;

use config::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::error::ConfigError as Error;
use crate::core::{config::Args, state::AppState, store};

pub async fn run() -> Result<(), Error> {
    let config = Config::builder()
        .add_source(
            config::Environment::default()
                .try_parsing(true)
                .ignore_empty(true),
        )
        .build()
        .map_err(Error::Config)?;

    let config = config.try_deserialize::<Args>().map_err(Error::Config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&config.log_level).unwrap_or_default())
        .with(tracing_subscriber::fmt::layer())
        .init();

    for setting in config.missing_settings() {
        tracing::warn!("{} is not set; flows that need it will fail", setting);
    }

    let pool = store::connect(&config.database_url).await?;

    let state = AppState::new(pool, &config)?;

    let app = routes::router::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .map_err(Error::IO)?;

    tracing::info!("listening on port {}", config.port);

    axum::serve(listener, app).await.map_err(Error::IO)?;

    Ok(())
}

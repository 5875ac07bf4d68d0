//! Serves the API over plain HTTP for local development.

use std::net::SocketAddr;

use anyhow::Context as _;
use user_auth_api::build_app;
use user_auth_api::config::ServerSettings;
use user_auth_api::util::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing(false);

    let settings = ServerSettings::from_env()?;
    let explorers = !settings.is_production();
    let app = build_app(explorers).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    if explorers {
        tracing::info!("connect to http://localhost:{}/graphiql for GraphiQL", settings.port);
        tracing::info!("connect to http://localhost:{}/apollo for Apollo Sandbox", settings.port);
    }
    tracing::info!(env = %settings.env, "listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

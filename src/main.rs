use anyhow::Context;
use kakeibo::{config::Config, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    if std::env::var("ENV").ok().as_deref() != Some("prod") {
        dotenvy::dotenv().ok();
    }
    let config = Config::from_env().context("Failed to read configuration")?;
    let bind = config.bind;
    let state = server::AppState::new(config).context("Failed to build application state")?;

    let app = server::app().with_state(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Couldn't listen on {bind}"))?;
    tracing::info!(%bind, "kakeibo listening");
    axum::serve(listener, app).await?;
    Ok(())
}

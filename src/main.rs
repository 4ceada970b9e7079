use std::net::SocketAddr;

use anyhow::Context;

use church_auth::{
    auth::bootstrap::seed_admin, config::AppConfig, db::connection, logging::init_tracing,
    routes::app, services::ServiceContext, state::AppState,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!("server failed: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env().context("failed to load config")?;
    init_tracing(&cfg.logging);

    let db_cfg = cfg
        .database
        .as_ref()
        .context("database config is required (APP_DATABASE__URL)")?;
    let db = connection::connect(db_cfg).await?;

    seed_admin(&cfg.auth, &ServiceContext::new(&db)).await?;

    let addr: SocketAddr = format!("{}:{}", cfg.general.host, cfg.general.port)
        .parse()
        .context("invalid host/port")?;
    let state = AppState::new(cfg, db)?;
    let app = app(state);

    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

use inventario_mock::{AppState, Config, router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inventario_mock=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    if let Some(delay) = config.profile_delay {
        info!(?delay, "Profile reads are delayed");
    }

    let state = Arc::new(AppState::new(config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("inventario-mock listening on {}", addr);
    info!("Seeded logins: admin / admin123, vendedor / vendedor123");
    axum::serve(listener, app).await?;

    Ok(())
}

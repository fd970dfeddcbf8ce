// inventario-client/examples/session_flow.rs
// Sign in, check a few permissions, sign out
//
// Start the mock first: `cargo run -p inventario-mock`, then
// `cargo run -p inventario-client --example session_flow -- vendedor vendedor123`

use inventario_client::{ClientConfig, SessionStore, logger};
use shared::permissions::{ALL_ACTIONS, ALL_MODULES};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init_logger("info", false)?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        println!("Usage: {} <username|email> <password>", args[0]);
        println!("  Example: {} vendedor vendedor123", args[0]);
        return Ok(());
    }

    let config = ClientConfig::from_env()?;
    let backend = Arc::new(config.build_rest_backend()?);
    let store = SessionStore::new(backend, &config);
    let listener = store.spawn_listener();

    store.bootstrap().await;
    let snapshot = store.sign_in(&args[1], &args[2]).await?;
    tracing::info!(
        user_id = snapshot.user_id().unwrap_or("-"),
        role = snapshot.role_label(),
        "Signed in"
    );

    for module in ALL_MODULES {
        let granted: Vec<&str> = ALL_ACTIONS
            .iter()
            .copied()
            .filter(|action| store.has_permission(module, action))
            .collect();
        println!("{:<12} {}", module, granted.join(", "));
    }

    store.sign_out().await?;
    tracing::info!(loading = store.snapshot().loading, "Signed out");
    listener.abort();
    Ok(())
}

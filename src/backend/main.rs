/**
 * relaychat Server Entry Point
 *
 * Loads configuration, connects the database, serves the router and shuts
 * down in order on Ctrl-C: new requests stop, live sessions drain, then
 * the bus closes.
 */

use relaychat::backend::server::{create_app, load_database, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,relaychat=debug".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    tracing::info!("[STARTUP] Server initialization started");

    let config = ServerConfig::from_env()?;
    let addr = config.bind_address();
    let pool = load_database(&config).await?;
    let (app, shutdown) = create_app(pool, config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[STARTUP] Listening on {}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("[Server] Ctrl-C received"),
                Err(e) => tracing::error!("[Server] failed to listen for Ctrl-C: {}", e),
            }
            signal.shutdown().await;
        })
        .await?;

    tracing::info!("[Server] stopped");
    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;

use parcel_gateway::api::{router, AppState};
use parcel_gateway::config::{Config, LISTEN_PORT};
use parcel_gateway::ledger::LedgerClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Startup configuration is the only fatal error class; everything after
    // this point is recovered per request.
    let config = Config::from_env()?;
    let ledger = Arc::new(LedgerClient::new(&config)?);
    log::info!("ledger endpoint {} contract {}", config.api_url, config.contract_address);

    let app = router(AppState { ledger });

    let addr = SocketAddr::from(([0, 0, 0, 0], LISTEN_PORT));
    println!("parcel-gateway on http://{addr}/");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

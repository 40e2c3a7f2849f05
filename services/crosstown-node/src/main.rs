//! Crosstown node binary: the process that wires every crate in the
//! workspace into one running fabric participant.
//!
//! Follows `openibank-server`'s single-binary shape: one `clap` entry point,
//! one `tracing` init, a handful of components built from config and handed
//! to axum routers and a background state machine. Unlike `openibank-server`
//! there is no dashboard — this binary exposes two HTTP surfaces (the relay
//! WebSocket and the BLS admin surface) and nothing else.

mod error;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crosstown_bls::Bls;
use crosstown_bootstrap::{Bootstrap, BootstrapConfig};
use crosstown_config::{Config, ConnectorMode};
use crosstown_connector::{ConnectorAdmin, ConnectorChannel, ConnectorRuntime, EmbeddedConnector, RemoteConnector};
use crosstown_crypto::KeyPair;
use crosstown_pricing::{KindRow, PricingPolicy};
use crosstown_relay::Relay;
use crosstown_settlement::ChannelRegistry;
use crosstown_store::EventStore;
use crosstown_types::BootstrapEvent;

use error::{NodeError, NodeResult};

/// One flag to point at a config file; everything else layers in from
/// `CROSSTOWN_*` environment variables via [`crosstown_config::Config`].
#[derive(Parser, Debug)]
#[command(name = "crosstown-node", about = "Payment-gated event relay and peer-networking node", version)]
struct Args {
    /// Path to a JSON config file. Falls back to `CROSSTOWN_CONFIG_FILE`,
    /// then to built-in defaults layered with environment overrides.
    #[arg(long, env = "CROSSTOWN_CONFIG_FILE")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> NodeResult<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let base = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let config = Config::from_env_over(base);
    config.validate()?;
    tracing::info!(config = ?config.redacted(), "starting crosstown node");

    let keypair = Arc::new(KeyPair::from_hex(&config.private_key)?);
    tracing::info!(pubkey = %keypair.public_key().0, "node identity loaded");

    let store = Arc::new(EventStore::connect(&config.store.path).await?);

    let pricing = Arc::new(build_pricing(&config));
    let bls = Arc::new(Bls::new(store.clone(), pricing.clone()));
    let channels = ChannelRegistry::new();

    let (runtime, admin, channel): (Arc<dyn ConnectorRuntime>, Arc<dyn ConnectorAdmin>, Arc<dyn ConnectorChannel>) =
        match config.connector_mode {
            ConnectorMode::Embedded => {
                let connector = Arc::new(EmbeddedConnector::new(config.ilp_address.clone(), bls.clone(), channels.clone()));
                (
                    connector.clone() as Arc<dyn ConnectorRuntime>,
                    connector.clone() as Arc<dyn ConnectorAdmin>,
                    connector as Arc<dyn ConnectorChannel>,
                )
            }
            ConnectorMode::Remote => {
                let url = config.connector_url.clone().ok_or(NodeError::MissingConfig("connectorUrl"))?;
                let connector = Arc::new(RemoteConnector::new(url));
                (
                    connector.clone() as Arc<dyn ConnectorRuntime>,
                    connector.clone() as Arc<dyn ConnectorAdmin>,
                    connector as Arc<dyn ConnectorChannel>,
                )
            }
        };

    let bootstrap = Bootstrap::new(
        build_bootstrap_config(&config),
        keypair.clone(),
        store.clone(),
        pricing.clone(),
        runtime,
        admin,
        channel,
    );
    spawn_bootstrap_logger(bootstrap.subscribe_events());
    let bootstrap_handle = bootstrap.clone();
    tokio::spawn(async move {
        if let Err(e) = bootstrap_handle.run().await {
            tracing::warn!(error = %e, "bootstrap did not reach ready");
        }
    });

    let relay = Relay::new(store.clone());
    let relay_router: Router = relay.router().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());
    let bls_router: Router = crosstown_bls::http::router(bls).layer(TraceLayer::new_for_http());

    let relay_listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    let bls_listener = tokio::net::TcpListener::bind(&config.bls_http_addr).await?;

    tracing::info!(addr = %config.listen_addr, "relay WebSocket server listening");
    tracing::info!(addr = %config.bls_http_addr, "BLS HTTP surface listening");

    let relay_task = tokio::spawn(async move { axum::serve(relay_listener, relay_router).await });
    let bls_task = tokio::spawn(async move { axum::serve(bls_listener, bls_router).await });

    tokio::select! {
        res = relay_task => { res??; }
        res = bls_task => { res??; }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
            bootstrap.stop();
        }
    }

    Ok(())
}

fn build_pricing(config: &Config) -> PricingPolicy {
    let mut rows = HashMap::new();
    for row in &config.pricing.kind_rows {
        rows.insert(row.kind, KindRow { base: row.base, per_byte: row.per_byte });
    }
    let default_row = KindRow { base: config.pricing.default_base, per_byte: config.pricing.default_per_byte };
    PricingPolicy::new(rows, default_row)
        .with_owner_bypass(config.pricing.owner_bypass.clone())
        .with_default_free_handshake_kinds()
}

fn build_bootstrap_config(config: &Config) -> BootstrapConfig {
    BootstrapConfig {
        known_peers: config.bootstrap.known_peers.clone(),
        discovery_window: std::time::Duration::from_millis(config.bootstrap.discovery_window_ms),
        min_peers: config.bootstrap.min_peers,
        handshake_timeout: std::time::Duration::from_millis(config.settlement.handshake_timeout_ms),
        shutdown_budget: std::time::Duration::from_secs(5),
        supported_chains: config.settlement.supported_chains.clone(),
        settlement_addresses: config.settlement.addresses.clone(),
        preferred_tokens: config.settlement.tokens.clone(),
        local_ilp_address: config.ilp_address.clone(),
        local_btp_endpoint: config.listen_addr.clone(),
        default_deposit: config.settlement.deposit,
    }
}

/// Logs advisory bootstrap transitions as they arrive; a lagged
/// receiver just resumes from whatever's next; these are observability only,
/// not part of any invariant.
fn spawn_bootstrap_logger(mut events: tokio::sync::broadcast::Receiver<BootstrapEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(?event, "bootstrap event"),
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    });
}

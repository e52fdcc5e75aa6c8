use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use corral_api::{AuthToken, CreateHandler};
use corral_store::KubeCattleStore;

#[derive(Parser, Debug)]
#[command(name = "corral-server", version, about = "Corral Cattle CRD control API")]
struct Args {
    /// Listen address
    #[arg(long = "bind", env = "CORRAL_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Namespace Cattle records are created in
    #[arg(long = "ns", env = "CORRAL_NAMESPACE", default_value = corral_store::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Bearer token required on create requests
    #[arg(long = "token", env = "INTERNAL_API_AUTH_TOKEN", hide_env_values = true)]
    token: String,

    /// Report a create-time conflict (lost creation race) as 409 instead of 500
    #[arg(long = "conflict-on-create-race", env = "CORRAL_CONFLICT_ON_CREATE_RACE")]
    conflict_on_create_race: bool,
}

fn init_tracing() {
    let env = std::env::var("CORRAL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CORRAL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CORRAL_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let args = Args::parse();

    let store = KubeCattleStore::connect(&args.namespace).await?;
    info!(ns = %args.namespace, "connected to cluster");

    let handler = CreateHandler::new(Arc::new(store), AuthToken::new(&args.token))
        .conflict_on_create_race(args.conflict_on_create_race);

    corral_server::run(args.bind, Arc::new(handler)).await
}

//! hmbridged - Homematic RPC ⇄ MQTT gateway daemon
//!
//! Discovers the controller's RPC interfaces, registers callback servers
//! with each of them and mirrors device state onto MQTT topics.
//!
//! Usage:
//!   hmbridged --ccu-address <host> [OPTIONS]
//!
//! Every option can also be set through its `HMBRIDGE_*` environment
//! variable; see `hmbridged --help`.

mod config;
mod mqtt;
mod store;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use hmbridge_core::{NameTable, WireProtocol};
use hmbridge_gateway::Gateway;
use hmbridge_rpc::{create_client, default_candidates, discover, BinRpcServer, XmlRpcServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Args;
use crate::store::FileStore;

/// Timeout of each discovery probe
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting hmbridged");

    let listen_address = args.resolve_listen_address()?;
    let config = args.gateway_config(listen_address.clone());
    let names = load_names(&args).await?;
    let store = FileStore::open(&args.data_dir)
        .await
        .with_context(|| format!("Opening data directory {}", args.data_dir.display()))?;

    tracing::info!(ccu = %args.ccu_address, "Discovering interfaces");
    let interfaces = discover(&args.ccu_address, default_candidates(), DISCOVERY_TIMEOUT).await;
    if interfaces.is_empty() {
        bail!("No interface reachable on {}", args.ccu_address);
    }

    let (bus, eventloop) = mqtt::connect(&args.mqtt_url, &args.name, args.mqtt_retain)?;

    let mut builder = Gateway::builder(config, Arc::new(bus.clone()), Arc::new(store)).names(names);
    for spec in &interfaces {
        let client = create_client(spec, &args.ccu_address)?;
        builder = builder.interface(spec.clone(), client);
    }
    let gateway = Arc::new(builder.build());

    // Callback servers must be up before the first init
    let ip: IpAddr = listen_address
        .parse()
        .with_context(|| format!("Listen address {} is not an IP address", listen_address))?;
    let uses = |protocol: WireProtocol| interfaces.iter().any(|spec| spec.protocol == protocol);
    if uses(WireProtocol::BinRpc) {
        let addr = SocketAddr::new(ip, args.binrpc_listen_port);
        BinRpcServer::bind(addr, gateway.handler()).await?.spawn();
    }
    if uses(WireProtocol::XmlRpc) {
        let addr = SocketAddr::new(ip, args.listen_port);
        XmlRpcServer::bind(addr, gateway.handler()).await?.spawn();
    }

    let _mqtt_tasks = mqtt::spawn(
        bus,
        eventloop,
        Arc::clone(&gateway),
        args.name.clone(),
        args.mqtt_url.clone(),
    );

    gateway.start().await;

    wait_for_signal().await?;
    let clean = gateway.shutdown().await;
    std::process::exit(if clean { 0 } else { 1 });
}

/// Static name table from `--json-name-table`
async fn load_names(args: &Args) -> anyhow::Result<NameTable> {
    let Some(path) = &args.json_name_table else {
        return Ok(NameTable::new());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Reading name table {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Parsing name table {}", path.display()))?;
    let names = NameTable::from_json(&value);
    tracing::info!(count = names.len(), "Loaded name table");
    Ok(names)
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    tracing::info!("Signal received");
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Signal received");
    Ok(())
}

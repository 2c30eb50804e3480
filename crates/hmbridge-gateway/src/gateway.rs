//! Gateway supervisor: wiring, interface lifecycles and shutdown

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hmbridge_core::{
    BlobStore, LogicLayer, MessageBus, NameTable, NoLogicLayer, RpcClient, RpcHandler, WireProtocol,
};
use hmbridge_rpc::InterfaceSpec;
use parking_lot::{Mutex, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::connection::{liveness_action, ConnectionState, InterfaceConnection, LivenessAction};
use crate::context::GatewayContext;
use crate::dispatcher::InboundDispatcher;
use crate::duty_cycle::{reports_duty_cycle, spawn_poller};
use crate::fetch_queue::FetchQueue;
use crate::registry::MetadataRegistry;
use crate::router;
use crate::timers::DebounceTimers;
use crate::values::ValueTracker;

/// Builder for [`Gateway`]
pub struct GatewayBuilder {
    config: GatewayConfig,
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn BlobStore>,
    logic: Arc<dyn LogicLayer>,
    names: NameTable,
    interfaces: Vec<(InterfaceSpec, Arc<dyn RpcClient>)>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig, bus: Arc<dyn MessageBus>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            config,
            bus,
            store,
            logic: Arc::new(NoLogicLayer),
            names: NameTable::new(),
            interfaces: Vec::new(),
        }
    }

    pub fn logic(mut self, logic: Arc<dyn LogicLayer>) -> Self {
        self.logic = logic;
        self
    }

    pub fn names(mut self, names: NameTable) -> Self {
        self.names = names;
        self
    }

    /// Add a discovered interface and the client talking to it
    pub fn interface(mut self, spec: InterfaceSpec, client: Arc<dyn RpcClient>) -> Self {
        self.interfaces.push((spec, client));
        self
    }

    pub fn build(self) -> Gateway {
        let host = self.config.callback_host().to_string();
        let mut connections = HashMap::new();
        let mut fetch_queues = HashMap::new();
        for (spec, client) in self.interfaces {
            let port = match spec.protocol {
                WireProtocol::BinRpc => self.config.binrpc_port,
                WireProtocol::XmlRpc => self.config.xmlrpc_port,
            };
            let url = spec.protocol.callback_url(&host, port);
            fetch_queues.insert(spec.name.clone(), FetchQueue::new());
            connections.insert(
                spec.name.clone(),
                Arc::new(InterfaceConnection::new(spec, client, url)),
            );
        }

        Gateway {
            ctx: Arc::new(GatewayContext {
                config: self.config,
                bus: self.bus,
                store: self.store,
                logic: self.logic,
                registry: MetadataRegistry::new(),
                values: ValueTracker::new(),
                names: RwLock::new(self.names),
                connections,
                fetch_queues,
                working: Mutex::new(HashMap::new()),
                notworking_timers: DebounceTimers::new(),
                rebuild_timers: DebounceTimers::new(),
                all_connected: Mutex::new(None),
            }),
        }
    }
}

/// The running gateway engine
///
/// Dropping it stops every background task it started.
pub struct Gateway {
    ctx: Arc<GatewayContext>,
}

impl Gateway {
    pub fn builder(
        config: GatewayConfig,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn BlobStore>,
    ) -> GatewayBuilder {
        GatewayBuilder::new(config, bus, store)
    }

    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.ctx
    }

    /// Handler to mount on the BIN-RPC and XML-RPC callback servers
    pub fn handler(&self) -> Arc<dyn RpcHandler> {
        Arc::new(InboundDispatcher::new(Arc::clone(&self.ctx)))
    }

    /// Load persisted metadata and start registering every interface
    ///
    /// The callback servers must already be listening.
    pub async fn start(&self) {
        self.ctx.load_persisted().await;

        for conn in self.ctx.connections.values() {
            let ctx = Arc::clone(&self.ctx);
            let task_conn = Arc::clone(conn);
            conn.add_task(tokio::spawn(async move {
                run_interface(ctx, task_conn).await;
            }));

            let period = self.ctx.config.duty_cycle_interval;
            if !period.is_zero() && reports_duty_cycle(conn.name()) {
                info!(interface = conn.name(), period_secs = period.as_secs(), "Polling duty cycle");
                conn.add_task(spawn_poller(Arc::clone(&self.ctx), Arc::clone(conn), period));
            }
        }
    }

    /// The bus (re)connected: announce the current aggregate
    pub async fn on_bus_connected(&self) {
        self.ctx.announce_connected().await;
    }

    /// Route a bus message
    pub async fn handle_message(&self, topic: &str, payload: &str) {
        router::route(&self.ctx, topic, payload).await;
    }

    pub fn set_names(&self, names: NameTable) {
        info!(count = names.len(), "Name table replaced");
        *self.ctx.names.write() = names;
    }

    pub fn connection_state(&self, interface: &str) -> Option<ConnectionState> {
        self.ctx.connection(interface).map(|c| c.state())
    }

    pub fn all_connected(&self) -> bool {
        self.ctx.all_connected()
    }

    /// Deregister from every interface concurrently
    ///
    /// Returns `false` when the grace period ran out first; calls still
    /// pending then are abandoned.
    pub async fn shutdown(&self) -> bool {
        info!("Shutting down");
        self.stop_tasks();

        let grace = self.ctx.config.shutdown_grace;
        let deregistrations = self
            .ctx
            .connections
            .values()
            .map(|conn| conn.deregister());
        let completed = tokio::time::timeout(grace, join_all(deregistrations))
            .await
            .is_ok();
        if !completed {
            warn!(grace_ms = grace.as_millis() as u64, "Deregistration did not finish in time");
        }
        self.ctx.refresh_connected().await;
        completed
    }

    fn stop_tasks(&self) {
        for conn in self.ctx.connections.values() {
            conn.abort_tasks();
        }
        self.ctx.rebuild_timers.cancel_all();
        self.ctx.notworking_timers.cancel_all();
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

/// Bring one interface up, then keep it alive
async fn run_interface(ctx: Arc<GatewayContext>, conn: Arc<InterfaceConnection>) {
    if conn.spec().protocol == WireProtocol::BinRpc {
        wait_for_transport(&ctx, &conn).await;
    }
    init_interface(&ctx, &conn).await;

    let reconnect = reconnect_interval(&ctx.config, conn.name());
    let period = reconnect.unwrap_or(ctx.config.ping_interval);
    if period.is_zero() {
        debug!(interface = conn.name(), "Liveness checks disabled");
        return;
    }

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        check_liveness(&ctx, &conn, reconnect).await;
    }
}

/// Retry the BIN-RPC connection until it is up
async fn wait_for_transport(ctx: &GatewayContext, conn: &InterfaceConnection) {
    loop {
        match conn.client().connect().await {
            Ok(()) => return,
            Err(e) => {
                warn!(
                    interface = conn.name(),
                    error = %e,
                    retry_secs = ctx.config.connect_retry_interval.as_secs(),
                    "Interface not reachable"
                );
                tokio::time::sleep(ctx.config.connect_retry_interval).await;
            }
        }
    }
}

async fn init_interface(ctx: &GatewayContext, conn: &InterfaceConnection) {
    // Failures are logged by the connection and retried by the liveness check
    let _ = conn.init().await;
    ctx.refresh_connected().await;
}

fn reconnect_interval(config: &GatewayConfig, interface: &str) -> Option<Duration> {
    config
        .reconnect_intervals
        .get(interface)
        .copied()
        .filter(|d| !d.is_zero())
}

async fn check_liveness(
    ctx: &GatewayContext,
    conn: &Arc<InterfaceConnection>,
    reconnect: Option<Duration>,
) {
    let elapsed = conn.elapsed().unwrap_or(Duration::MAX);
    debug!(interface = conn.name(), elapsed_secs = elapsed.as_secs(), "Liveness check");

    match liveness_action(elapsed, ctx.config.ping_interval, reconnect) {
        LivenessAction::Reinit => {
            info!(interface = conn.name(), elapsed_secs = elapsed.as_secs(), "No events, re-registering");
            conn.set_state(ConnectionState::Disconnected);
            ctx.refresh_connected().await;
            init_interface(ctx, conn).await;
        }
        LivenessAction::Ping => {
            let conn = Arc::clone(conn);
            tokio::spawn(async move { conn.ping().await });
        }
        LivenessAction::None => {}
    }
    ctx.refresh_connected().await;
}

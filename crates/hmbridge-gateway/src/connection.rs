//! Interface connection state machine

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hmbridge_core::{RpcClient, RpcResult, RpcValue};
use hmbridge_rpc::InterfaceSpec;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Prefix of the client id announced in `init`
pub const CLIENT_ID_PREFIX: &str = "gateway_";

/// Argument of the keepalive `ping`
pub const PING_CALLER_ID: &str = "gateway";

/// Registration state of one controller interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Initializing,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Initializing => "initializing",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// What a liveness tick should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessAction {
    None,
    Ping,
    Reinit,
}

/// Decide the liveness action from the time since the last event
///
/// Elapsed time is counted in whole seconds, rounded up. Interfaces with a
/// reconnect interval are never pinged.
///
/// ```
/// # use std::time::Duration;
/// # use hmbridge_gateway::connection::{liveness_action, LivenessAction};
/// let ping = Duration::from_secs(30);
/// assert_eq!(liveness_action(Duration::from_secs(10), ping, None), LivenessAction::None);
/// assert_eq!(liveness_action(Duration::from_secs(30), ping, None), LivenessAction::Ping);
/// assert_eq!(liveness_action(Duration::from_secs(60), ping, None), LivenessAction::Reinit);
/// ```
pub fn liveness_action(
    elapsed: Duration,
    ping_interval: Duration,
    reconnect_interval: Option<Duration>,
) -> LivenessAction {
    let elapsed = ceil_secs(elapsed);
    match reconnect_interval {
        Some(interval) if elapsed >= interval.as_secs() => LivenessAction::Reinit,
        Some(_) => LivenessAction::None,
        None if ping_interval.is_zero() => LivenessAction::None,
        None if elapsed >= 2 * ping_interval.as_secs() => LivenessAction::Reinit,
        None if elapsed >= ping_interval.as_secs() => LivenessAction::Ping,
        None => LivenessAction::None,
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0))
}

/// One controller interface: its RPC client, registration state and timers
pub struct InterfaceConnection {
    spec: InterfaceSpec,
    client: Arc<dyn RpcClient>,
    callback_url: String,
    state: RwLock<ConnectionState>,
    last_event_at: RwLock<Option<Instant>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl InterfaceConnection {
    pub fn new(spec: InterfaceSpec, client: Arc<dyn RpcClient>, callback_url: String) -> Self {
        Self {
            spec,
            client,
            callback_url,
            state: RwLock::new(ConnectionState::Disconnected),
            last_event_at: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &InterfaceSpec {
        &self.spec
    }

    pub fn client(&self) -> &Arc<dyn RpcClient> {
        &self.client
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// `gateway_<interface>`, the id the controller echoes in callbacks
    pub fn client_id(&self) -> String {
        format!("{}{}", CLIENT_ID_PREFIX, self.spec.name)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(interface = %self.spec.name, from = %previous, to = %state, "Interface state changed");
        }
    }

    /// Record controller activity
    pub fn touch(&self) {
        *self.last_event_at.write() = Some(Instant::now());
    }

    /// Time since the last event or `init`; `None` before the first one
    pub fn elapsed(&self) -> Option<Duration> {
        self.last_event_at.read().map(|at| at.elapsed())
    }

    /// Register the callback server with the controller
    pub async fn init(&self) -> RpcResult<()> {
        let params = vec![
            RpcValue::from(self.callback_url.as_str()),
            RpcValue::from(self.client_id()),
        ];
        info!(interface = %self.spec.name, url = %self.callback_url, client_id = %self.client_id(), "init");
        self.set_state(ConnectionState::Initializing);
        self.touch();

        match self.client.call("init", params).await {
            Ok(res) => {
                debug!(interface = %self.spec.name, result = ?res, "init done");
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                error!(interface = %self.spec.name, error = %e, "init failed");
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Fire a keepalive `ping`; failures are only logged
    pub async fn ping(&self) {
        debug!(interface = %self.spec.name, "ping");
        if let Err(e) = self
            .client
            .call("ping", vec![RpcValue::from(PING_CALLER_ID)])
            .await
        {
            error!(interface = %self.spec.name, error = %e, "ping failed");
        }
    }

    /// Unregister by announcing an empty client id
    pub async fn deregister(&self) {
        let params = vec![RpcValue::from(self.callback_url.as_str()), RpcValue::from("")];
        info!(interface = %self.spec.name, url = %self.callback_url, "init (deregister)");
        match self.client.call("init", params).await {
            Ok(_) => debug!(interface = %self.spec.name, "Deregistered"),
            Err(e) => error!(interface = %self.spec.name, error = %e, "Deregister failed"),
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Own a background task for this interface; aborted on drop
    pub fn add_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    pub fn abort_tasks(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for InterfaceConnection {
    fn drop(&mut self) {
        for handle in self.tasks.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Strip the client id prefix from an `interfaceClientID`
///
/// ```
/// # use hmbridge_gateway::connection::interface_name;
/// assert_eq!(interface_name("gateway_rfd"), "rfd");
/// assert_eq!(interface_name("rfd"), "rfd");
/// ```
pub fn interface_name(client_id: &str) -> &str {
    client_id.strip_prefix(CLIENT_ID_PREFIX).unwrap_or(client_id)
}

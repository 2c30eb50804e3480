//! Radio duty-cycle polling

use std::sync::Arc;
use std::time::Duration;

use hmbridge_core::topics::status_topic;
use hmbridge_core::RpcValue;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::connection::InterfaceConnection;
use crate::context::GatewayContext;

/// Interfaces that report radio duty cycle
pub const DUTY_CYCLE_INTERFACES: [&str; 2] = ["rfd", "hmip"];

pub fn reports_duty_cycle(interface: &str) -> bool {
    DUTY_CYCLE_INTERFACES.contains(&interface)
}

/// Call `listBidcosInterfaces` once and publish every entry's `DUTY_CYCLE`
pub async fn poll_duty_cycle(ctx: &GatewayContext, conn: &InterfaceConnection) {
    let result = match conn.client().call("listBidcosInterfaces", Vec::new()).await {
        Ok(result) => result,
        Err(e) => {
            error!(interface = conn.name(), error = %e, "listBidcosInterfaces failed");
            return;
        }
    };
    let Some(entries) = result.as_array() else {
        debug!(interface = conn.name(), result = ?result, "No interface list");
        return;
    };

    let ts = chrono::Utc::now().timestamp_millis();
    for entry in entries {
        let Some(address) = entry.get("ADDRESS").and_then(RpcValue::as_str) else {
            continue;
        };
        let val = entry
            .get("DUTY_CYCLE")
            .map(RpcValue::to_json)
            .unwrap_or(serde_json::Value::Null);
        ctx.publish(
            &status_topic(&ctx.config.name, address, "DUTY_CYCLE"),
            json!({ "val": val, "ts": ts }).to_string(),
            ctx.config.retain,
        )
        .await;
    }
}

/// Poll every `period`, starting one period from now
pub fn spawn_poller(
    ctx: Arc<GatewayContext>,
    conn: Arc<InterfaceConnection>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            poll_duty_cycle(&ctx, &conn).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_interfaces_only() {
        assert!(reports_duty_cycle("rfd"));
        assert!(reports_duty_cycle("hmip"));
        assert!(!reports_duty_cycle("hs485d"));
    }
}

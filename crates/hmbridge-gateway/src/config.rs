//! Gateway engine configuration

use std::collections::HashMap;
use std::time::Duration;

/// Runtime settings of the gateway engine
///
/// The daemon builds this from its command line; tests usually start from
/// [`GatewayConfig::default`] and override what they need.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Topic prefix and instance name
    pub name: String,
    /// Controller host; also part of the persistence keys
    pub ccu_address: String,
    /// Address the callback servers bind to
    pub listen_address: String,
    /// Address announced in `init`; falls back to `listen_address`
    pub init_address: Option<String>,
    /// XML-RPC callback port
    pub xmlrpc_port: u16,
    /// BIN-RPC callback port
    pub binrpc_port: u16,
    /// Retain flag for status and connected publishes
    pub retain: bool,
    /// Ping cadence for interfaces without a reconnect interval
    pub ping_interval: Duration,
    /// Interfaces re-initialized after a fixed quiet period, by name
    pub reconnect_intervals: HashMap<String, Duration>,
    /// Delay between BIN-RPC connect attempts before the first `init`
    pub connect_retry_interval: Duration,
    /// Quiet period before the paramset fetch queue is rebuilt
    pub rebuild_delay: Duration,
    /// Pause after each `getParamsetDescription`
    pub fetch_delay: Duration,
    /// Debounce of the `_NOTWORKING` publish
    pub notworking_delay: Duration,
    /// Deregistration deadline at shutdown
    pub shutdown_grace: Duration,
    /// Duty-cycle poll period; zero disables polling
    pub duty_cycle_interval: Duration,
    /// Publish device metadata after each fetch queue drain
    pub publish_metadata: bool,
    /// `CHANNEL.DATAPOINT` event that asks the logic layer to poll
    pub poll_trigger: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut reconnect_intervals = HashMap::new();
        reconnect_intervals.insert("hmip".to_string(), Duration::from_secs(600));
        Self {
            name: "hm".to_string(),
            ccu_address: String::new(),
            listen_address: "0.0.0.0".to_string(),
            init_address: None,
            xmlrpc_port: 2126,
            binrpc_port: 2127,
            retain: true,
            ping_interval: Duration::from_secs(30),
            reconnect_intervals,
            connect_retry_interval: Duration::from_secs(10),
            rebuild_delay: Duration::from_secs(5),
            fetch_delay: Duration::from_millis(500),
            notworking_delay: Duration::from_millis(500),
            shutdown_grace: Duration::from_millis(2500),
            duty_cycle_interval: Duration::ZERO,
            publish_metadata: false,
            poll_trigger: None,
        }
    }
}

impl GatewayConfig {
    /// Host announced to the controller in callback URLs
    pub fn callback_host(&self) -> &str {
        self.init_address.as_deref().unwrap_or(&self.listen_address)
    }

    /// `(channel, datapoint)` of the logic-layer poll trigger
    pub fn poll_trigger_parts(&self) -> Option<(&str, &str)> {
        self.poll_trigger
            .as_deref()
            .and_then(|trigger| trigger.split_once('.'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.name, "hm");
        assert_eq!(config.callback_host(), "0.0.0.0");
        assert_eq!(
            config.reconnect_intervals.get("hmip"),
            Some(&Duration::from_secs(600))
        );
        assert!(config.duty_cycle_interval.is_zero());
    }

    #[test]
    fn test_init_address_overrides_listen_address() {
        let config = GatewayConfig {
            listen_address: "192.168.1.10".to_string(),
            init_address: Some("ccu-bridge.local".to_string()),
            poll_trigger: Some("BidCoS-RF:50.PRESS_SHORT".to_string()),
            ..Default::default()
        };
        assert_eq!(config.callback_host(), "ccu-bridge.local");
        assert_eq!(
            config.poll_trigger_parts(),
            Some(("BidCoS-RF:50", "PRESS_SHORT"))
        );
    }
}

//! Command line and environment configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser};
use hmbridge_gateway::GatewayConfig;

/// Homematic RPC ⇄ MQTT gateway
#[derive(Debug, Parser)]
#[command(name = "hmbridged")]
#[command(author, version, about = "Homematic CCU RPC to MQTT gateway")]
pub struct Args {
    /// Controller (CCU) address
    #[arg(short = 'a', long, env = "HMBRIDGE_CCU_ADDRESS")]
    pub ccu_address: String,

    /// Instance name, used as topic prefix
    #[arg(short = 'n', long, env = "HMBRIDGE_NAME", default_value = "hm")]
    pub name: String,

    /// MQTT broker URL (mqtt:// or mqtts://, credentials in the URL)
    #[arg(short = 'm', long, env = "HMBRIDGE_MQTT_URL", default_value = "mqtt://127.0.0.1")]
    pub mqtt_url: String,

    /// Retain status and connected messages
    #[arg(long, env = "HMBRIDGE_MQTT_RETAIN", default_value_t = true, action = ArgAction::Set)]
    pub mqtt_retain: bool,

    /// Address the callback servers listen on; defaults to the first local address
    #[arg(short = 'r', long, env = "HMBRIDGE_LISTEN_ADDRESS")]
    pub listen_address: Option<String>,

    /// Address announced to the controller, if different from the listen address
    #[arg(short = 's', long, env = "HMBRIDGE_INIT_ADDRESS")]
    pub init_address: Option<String>,

    /// XML-RPC callback port
    #[arg(short = 'l', long, env = "HMBRIDGE_LISTEN_PORT", default_value_t = 2126)]
    pub listen_port: u16,

    /// BIN-RPC callback port
    #[arg(short = 'b', long, env = "HMBRIDGE_BINRPC_LISTEN_PORT", default_value_t = 2127)]
    pub binrpc_listen_port: u16,

    /// Seconds without events before an interface is pinged; twice that re-registers
    #[arg(short = 'i', long, env = "HMBRIDGE_PING_INTERVAL", default_value_t = 30)]
    pub ping_interval: u64,

    /// Seconds without events before hmip is re-registered (0 uses pings)
    #[arg(short = 'q', long, env = "HMBRIDGE_HMIP_RECONNECT_INTERVAL", default_value_t = 600)]
    pub hmip_reconnect_interval: u64,

    /// Seconds between duty-cycle polls (0 disables)
    #[arg(long, env = "HMBRIDGE_DUTY_CYCLE_POLL_INTERVAL", default_value_t = 0)]
    pub duty_cycle_poll_interval: u64,

    /// JSON file with an `{"ADDRESS": "name"}` name table
    #[arg(short = 'j', long, env = "HMBRIDGE_JSON_NAME_TABLE")]
    pub json_name_table: Option<PathBuf>,

    /// Publish device metadata to db/extend/<name>/<address>
    #[arg(long, env = "HMBRIDGE_PUBLISH_METADATA")]
    pub publish_metadata: bool,

    /// CHANNEL.DATAPOINT event that triggers a logic-layer poll
    #[arg(long, env = "HMBRIDGE_REGA_POLL_TRIGGER")]
    pub rega_poll_trigger: Option<String>,

    /// Directory for persisted device and paramset descriptions
    #[arg(long, env = "HMBRIDGE_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'v', long, env = "HMBRIDGE_VERBOSITY", default_value = "info")]
    pub verbosity: String,
}

impl Args {
    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> String {
        let level = &self.verbosity;
        format!(
            "hmbridged={level},hmbridge_gateway={level},hmbridge_rpc={level},hmbridge_conv={level},hmbridge_core={level}"
        )
    }

    /// Listen address, detecting a local one when none is given
    pub fn resolve_listen_address(&self) -> anyhow::Result<String> {
        match &self.listen_address {
            Some(address) => Ok(address.clone()),
            None => local_ip_address::local_ip()
                .map(|ip| ip.to_string())
                .context("No local address found, use --listen-address"),
        }
    }

    pub fn gateway_config(&self, listen_address: String) -> GatewayConfig {
        let mut reconnect_intervals = HashMap::new();
        if self.hmip_reconnect_interval > 0 {
            reconnect_intervals.insert(
                "hmip".to_string(),
                Duration::from_secs(self.hmip_reconnect_interval),
            );
        }

        GatewayConfig {
            name: self.name.clone(),
            ccu_address: self.ccu_address.clone(),
            listen_address,
            init_address: self.init_address.clone(),
            xmlrpc_port: self.listen_port,
            binrpc_port: self.binrpc_listen_port,
            retain: self.mqtt_retain,
            ping_interval: Duration::from_secs(self.ping_interval),
            reconnect_intervals,
            duty_cycle_interval: Duration::from_secs(self.duty_cycle_poll_interval),
            publish_metadata: self.publish_metadata,
            poll_trigger: self.rega_poll_trigger.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["hmbridged", "-a", "10.0.0.5", "-r", "10.0.0.2"]).unwrap();
        let config = args.gateway_config(args.resolve_listen_address().unwrap());

        assert_eq!(config.name, "hm");
        assert_eq!(config.ccu_address, "10.0.0.5");
        assert_eq!(config.callback_host(), "10.0.0.2");
        assert_eq!(config.xmlrpc_port, 2126);
        assert_eq!(config.binrpc_port, 2127);
        assert!(config.retain);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(
            config.reconnect_intervals.get("hmip"),
            Some(&Duration::from_secs(600))
        );
        assert!(config.duty_cycle_interval.is_zero());
        assert_eq!(args.mqtt_url, "mqtt://127.0.0.1");
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "hmbridged",
            "--ccu-address",
            "ccu3",
            "-n",
            "ccu",
            "--mqtt-retain",
            "false",
            "-q",
            "0",
            "-s",
            "bridge.local",
            "--rega-poll-trigger",
            "BidCoS-RF:50.PRESS_SHORT",
            "-v",
            "debug",
        ])
        .unwrap();
        let config = args.gateway_config("10.0.0.2".to_string());

        assert_eq!(config.name, "ccu");
        assert!(!config.retain);
        assert!(config.reconnect_intervals.is_empty());
        assert_eq!(config.callback_host(), "bridge.local");
        assert_eq!(config.poll_trigger_parts(), Some(("BidCoS-RF:50", "PRESS_SHORT")));
        assert!(args.log_filter().starts_with("hmbridged=debug,"));
    }

    #[test]
    fn test_ccu_address_required() {
        assert!(Args::try_parse_from(["hmbridged"]).is_err());
    }
}

//! Shared harness for gateway integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hmbridge_core::{NameTable, RpcHandler, RpcValue, WireProtocol};
use hmbridge_gateway::testing::{MemoryStore, RecordingBus, RecordingLogic};
use hmbridge_gateway::{Gateway, GatewayConfig};
use hmbridge_rpc::{InterfaceSpec, MockRpcClient};
use serde_json::{json, Value};

pub const CCU: &str = "10.0.0.5";

pub fn hmip_devices() -> Value {
    json!({
        "ABC1234": {"ADDRESS": "ABC1234", "TYPE": "HmIP-BROLL", "VERSION": 12,
                    "PARAMSETS": ["MASTER"], "CHILDREN": ["ABC1234:1", "ABC1234:2"]},
        "ABC1234:1": {"ADDRESS": "ABC1234:1", "PARENT": "ABC1234", "PARENT_TYPE": "HmIP-BROLL",
                      "TYPE": "SHUTTER", "VERSION": 12, "PARAMSETS": ["MASTER", "VALUES"]},
        "ABC1234:2": {"ADDRESS": "ABC1234:2", "PARENT": "ABC1234", "PARENT_TYPE": "HmIP-BROLL",
                      "TYPE": "KEY_TRANSCEIVER", "VERSION": 12, "PARAMSETS": ["VALUES"]},
        "THM0001:1": {"ADDRESS": "THM0001:1", "PARENT": "THM0001", "PARENT_TYPE": "HmIP-eTRV",
                      "TYPE": "HEATING_CLIMATECONTROL_TRANSCEIVER", "VERSION": 5,
                      "PARAMSETS": ["MASTER", "VALUES"]}
    })
}

pub fn rfd_devices() -> Value {
    json!({
        "LEQ0001:1": {"ADDRESS": "LEQ0001:1", "PARENT": "LEQ0001", "PARENT_TYPE": "HM-LC-Dim1T-FM",
                      "TYPE": "DIMMER", "VERSION": 1, "PARAMSETS": ["MASTER", "VALUES"]}
    })
}

pub fn paramsets() -> Value {
    json!({
        "HmIP-BROLL/12/SHUTTER": {
            "MASTER": {},
            "VALUES": {
                "LEVEL": {"TYPE": "FLOAT", "OPERATIONS": 7, "MIN": 0.0, "MAX": 1.0, "UNIT": "100%"},
                "ACTIVITY_STATE": {"TYPE": "ENUM", "OPERATIONS": 5, "MIN": 0, "MAX": 3,
                                   "VALUE_LIST": ["UNKNOWN", "UP", "DOWN", "STABLE"]},
                "PROCESS": {"TYPE": "ENUM", "OPERATIONS": 5, "VALUE_LIST": ["STABLE", "NOT_STABLE"]}
            }
        },
        "HmIP-BROLL/12/KEY_TRANSCEIVER": {
            "VALUES": {"PRESS_SHORT": {"TYPE": "ACTION", "OPERATIONS": 6}}
        },
        "HmIP-eTRV/5/HEATING_CLIMATECONTROL_TRANSCEIVER": {
            "VALUES": {
                "SET_POINT_TEMPERATURE": {"TYPE": "FLOAT", "OPERATIONS": 7, "MIN": 4.5, "MAX": 30.5,
                                          "UNIT": "\u{FFFD}C"},
                "SET_POINT_MODE": {"TYPE": "ENUM", "OPERATIONS": 3,
                                   "VALUE_LIST": ["AUTOMATIC", "MANUAL", "PARTY"]}
            }
        },
        "HM-LC-Dim1T-FM/1/DIMMER": {
            "VALUES": {
                "LEVEL": {"TYPE": "FLOAT", "OPERATIONS": 7, "MIN": 0.0, "MAX": 100.0, "UNIT": "%"},
                "WORKING": {"TYPE": "BOOL", "OPERATIONS": 5}
            }
        }
    })
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        ccu_address: CCU.to_string(),
        listen_address: "10.0.0.2".to_string(),
        ping_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

/// A gateway wired to mocks for `rfd` (BIN-RPC) and `hmip` (XML-RPC)
pub struct Harness {
    pub bus: Arc<RecordingBus>,
    pub store: Arc<MemoryStore>,
    pub logic: Arc<RecordingLogic>,
    pub rfd: Arc<MockRpcClient>,
    pub hmip: Arc<MockRpcClient>,
    pub gateway: Gateway,
    pub handler: Arc<dyn RpcHandler>,
}

impl Harness {
    /// Build with persisted fixtures, without starting
    pub fn build(config: GatewayConfig) -> Self {
        let bus = Arc::new(RecordingBus::new());
        let store = Arc::new(
            MemoryStore::new()
                .with_blob(&format!("devices_{}_hmip", CCU), hmip_devices())
                .with_blob(&format!("devices_{}_rfd", CCU), rfd_devices())
                .with_blob(&format!("paramsetDescriptions_{}", CCU), paramsets()),
        );
        let logic = Arc::new(RecordingLogic::new());
        let rfd = Arc::new(MockRpcClient::new(WireProtocol::BinRpc));
        let hmip = Arc::new(MockRpcClient::new(WireProtocol::XmlRpc));

        let gateway = Gateway::builder(config, bus.clone(), store.clone())
            .logic(logic.clone())
            .names(NameTable::from_json(&json!({"ABC1234:1": "Kitchen Blind"})))
            .interface(InterfaceSpec::new("rfd", 2001, WireProtocol::BinRpc), rfd.clone())
            .interface(InterfaceSpec::new("hmip", 2010, WireProtocol::XmlRpc), hmip.clone())
            .build();
        let handler = gateway.handler();

        Self {
            bus,
            store,
            logic,
            rfd,
            hmip,
            gateway,
            handler,
        }
    }

    pub async fn start(config: GatewayConfig) -> Self {
        let harness = Self::build(config);
        harness.gateway.start().await;
        settle().await;
        harness
    }

    pub async fn event(&self, interface: &str, address: &str, datapoint: &str, value: RpcValue) {
        let params = vec![
            RpcValue::from(format!("gateway_{}", interface)),
            RpcValue::from(address),
            RpcValue::from(datapoint),
            value,
        ];
        let result = self.handler.handle("event", params).await.unwrap();
        assert_eq!(result, RpcValue::from(""));
    }

    pub async fn message(&self, topic: &str, payload: &str) {
        self.gateway.handle_message(topic, payload).await;
    }

    /// Payloads published to `{name}/connected`, oldest first
    pub fn connected_payloads(&self) -> Vec<String> {
        self.bus
            .on_topic("hm/connected")
            .into_iter()
            .map(|p| p.payload)
            .collect()
    }
}

/// Let spawned tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn device_list(devices: Value) -> RpcValue {
    RpcValue::from_json(&devices)
}

//! Controller callbacks → bus publishes

mod common;

use std::time::Duration;

use common::{settle, test_config, Harness};
use hmbridge_core::RpcValue;
use hmbridge_gateway::testing::LogicCall;
use hmbridge_gateway::GatewayConfig;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_event_publishes_status() {
    let h = Harness::start(test_config()).await;
    h.bus.clear();

    h.event("hmip", "ABC1234:1", "LEVEL", RpcValue::Double(0.5)).await;

    let published = h.bus.on_topic("hm/status/Kitchen Blind/LEVEL");
    assert_eq!(published.len(), 1);
    assert!(published[0].retain);
    let payload = published[0].json();
    assert_eq!(payload["val"], json!(0.5));
    assert_eq!(payload["ts"], payload["lc"]);
    assert_eq!(payload["hm"], json!({"ADDRESS": "ABC1234:1", "UNIT": "100%"}));
}

#[tokio::test]
async fn test_repeated_value_keeps_last_change() {
    let h = Harness::start(test_config()).await;
    h.bus.clear();

    h.event("hmip", "THM0001:1", "SET_POINT_TEMPERATURE", RpcValue::Double(21.5)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.event("hmip", "THM0001:1", "SET_POINT_TEMPERATURE", RpcValue::Double(21.5)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.event("hmip", "THM0001:1", "SET_POINT_TEMPERATURE", RpcValue::Double(22.0)).await;

    let payloads: Vec<_> = h
        .bus
        .on_topic("hm/status/THM0001:1/SET_POINT_TEMPERATURE")
        .iter()
        .map(|p| p.json())
        .collect();
    assert_eq!(payloads.len(), 3);
    assert_eq!(payloads[0]["hm"]["UNIT"], json!("°C"));

    let ts: Vec<i64> = payloads.iter().map(|p| p["ts"].as_i64().unwrap()).collect();
    let lc: Vec<i64> = payloads.iter().map(|p| p["lc"].as_i64().unwrap()).collect();
    assert!(ts[1] > ts[0]);
    assert_eq!(lc[1], lc[0]);
    assert_eq!(lc[2], ts[2]);
}

#[tokio::test]
async fn test_unknown_device_publishes_nothing() {
    let h = Harness::start(test_config()).await;
    h.bus.clear();

    h.event("hmip", "ZZZ9999:1", "LEVEL", RpcValue::Double(0.5)).await;
    // Known address, but reported by the wrong interface
    h.event("rfd", "ABC1234:1", "LEVEL", RpcValue::Double(0.5)).await;

    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn test_action_not_retained_and_enum_label() {
    let h = Harness::start(test_config()).await;
    h.bus.clear();

    h.event("hmip", "ABC1234:2", "PRESS_SHORT", RpcValue::Bool(true)).await;
    h.event("hmip", "ABC1234:1", "ACTIVITY_STATE", RpcValue::Int(2)).await;

    let press = &h.bus.on_topic("hm/status/ABC1234:2/PRESS_SHORT")[0];
    assert!(!press.retain);

    let activity = &h.bus.on_topic("hm/status/Kitchen Blind/ACTIVITY_STATE")[0];
    assert!(activity.retain);
    assert_eq!(activity.json()["hm"], json!({"ADDRESS": "ABC1234:1", "ENUM": "DOWN"}));
}

#[tokio::test]
async fn test_missing_datapoint_still_published() {
    let h = Harness::start(test_config()).await;
    h.bus.clear();

    h.event("hmip", "ABC1234:1", "ERROR_JAMMED", RpcValue::Bool(false)).await;

    let published = h.bus.on_topic("hm/status/Kitchen Blind/ERROR_JAMMED");
    assert_eq!(published.len(), 1);
    assert!(published[0].retain);
    assert_eq!(published[0].json()["hm"], json!({"ADDRESS": "ABC1234:1"}));
}

#[tokio::test]
async fn test_pong_only_refreshes_liveness() {
    let h = Harness::start(test_config()).await;
    h.bus.clear();

    h.event("rfd", "CENTRAL", "PONG", RpcValue::from("gateway_rfd")).await;
    assert!(h.bus.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_notworking_after_channel_settles() {
    let h = Harness::start(test_config()).await;
    h.bus.clear();

    h.event("rfd", "LEQ0001:1", "WORKING", RpcValue::Bool(true)).await;
    h.event("rfd", "LEQ0001:1", "LEVEL", RpcValue::Double(40.0)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    h.event("rfd", "LEQ0001:1", "WORKING", RpcValue::Bool(false)).await;
    h.event("rfd", "LEQ0001:1", "LEVEL", RpcValue::Double(60.0)).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.bus.on_topic("hm/status/LEQ0001:1/LEVEL_NOTWORKING").is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let settled = h.bus.on_topic("hm/status/LEQ0001:1/LEVEL_NOTWORKING");
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].json()["val"], json!(60.0));
}

#[tokio::test(start_paused = true)]
async fn test_no_notworking_while_moving() {
    let h = Harness::start(test_config()).await;

    h.event("rfd", "LEQ0001:1", "WORKING", RpcValue::Bool(true)).await;
    h.event("rfd", "LEQ0001:1", "LEVEL", RpcValue::Double(40.0)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(h.bus.on_topic("hm/status/LEQ0001:1/LEVEL_NOTWORKING").is_empty());
    // Channels that never reported WORKING get no settle publish
    h.event("hmip", "ABC1234:1", "LEVEL", RpcValue::Double(0.2)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.bus.on_topic("hm/status/Kitchen Blind/LEVEL_NOTWORKING").is_empty());
}

#[tokio::test]
async fn test_multicall_runs_in_order() {
    let h = Harness::start(test_config()).await;
    h.bus.clear();

    let call = |dp: &str, value: f64| {
        RpcValue::from_json(&json!({
            "methodName": "event",
            "params": ["gateway_hmip", "ABC1234:1", dp, value]
        }))
    };
    let calls = RpcValue::Array(vec![
        call("LEVEL", 0.1),
        RpcValue::from_json(&json!({"methodName": "setReadyConfig", "params": []})),
        call("LEVEL", 0.2),
    ]);

    let result = h.handler.handle("system.multicall", vec![calls]).await.unwrap();
    assert_eq!(
        result,
        RpcValue::Array(vec![RpcValue::from(""), RpcValue::from(""), RpcValue::from("")])
    );

    let values: Vec<_> = h
        .bus
        .on_topic("hm/status/Kitchen Blind/LEVEL")
        .iter()
        .map(|p| p.json()["val"].clone())
        .collect();
    assert_eq!(values, vec![json!(0.1), json!(0.2)]);
}

#[tokio::test]
async fn test_unknown_method_answers_empty() {
    let h = Harness::build(test_config());
    let result = h.handler.handle("updateDevice", vec![]).await.unwrap();
    assert_eq!(result, RpcValue::from(""));

    let methods = h.handler.handle("system.listMethods", vec![]).await.unwrap();
    assert!(methods.as_array().unwrap().contains(&RpcValue::from("event")));
}

#[tokio::test]
async fn test_malformed_event_is_a_fault() {
    let h = Harness::build(test_config());
    let result = h.handler.handle("event", vec![RpcValue::from("gateway_hmip")]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_poll_trigger_reaches_logic_layer() {
    let config = GatewayConfig {
        poll_trigger: Some("ABC1234:2.PRESS_SHORT".to_string()),
        ..test_config()
    };
    let h = Harness::start(config).await;

    h.event("hmip", "ABC1234:2", "PRESS_SHORT", RpcValue::Bool(true)).await;
    h.event("hmip", "ABC1234:1", "LEVEL", RpcValue::Double(0.3)).await;
    settle().await;

    assert_eq!(h.logic.calls(), vec![LogicCall::TriggerPoll]);
}

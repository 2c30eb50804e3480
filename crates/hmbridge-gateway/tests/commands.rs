//! Bus commands → RPC calls

mod common;

use std::collections::BTreeMap;

use common::{test_config, Harness};
use hmbridge_core::{RpcError, RpcValue};
use hmbridge_gateway::testing::LogicCall;
use pretty_assertions::assert_eq;

fn members(entries: &[(&str, RpcValue)]) -> RpcValue {
    RpcValue::Struct(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>(),
    )
}

#[tokio::test]
async fn test_set_by_display_name() {
    let h = Harness::start(test_config()).await;
    h.hmip.clear_calls();

    h.message("hm/set/Kitchen Blind/LEVEL", "0.7").await;
    h.message("hm/set/ABC1234:1/LEVEL", r#"{"val": 1.5}"#).await;

    assert_eq!(
        h.hmip.calls_to("setValue"),
        vec![
            vec![RpcValue::from("ABC1234:1"), RpcValue::from("LEVEL"), RpcValue::Double(0.7)],
            // Clamped to the declared maximum
            vec![RpcValue::from("ABC1234:1"), RpcValue::from("LEVEL"), RpcValue::Double(1.0)],
        ]
    );
    assert!(h.rfd.calls_to("setValue").is_empty());
}

#[tokio::test]
async fn test_enum_label_equals_index() {
    let h = Harness::start(test_config()).await;

    h.message("hm/set/THM0001:1/SET_POINT_MODE", "MANUAL").await;
    h.message("hm/set/THM0001:1/SET_POINT_MODE", "1").await;

    let calls = h.hmip.calls_to("setValue");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0][2], RpcValue::Int(1));
    assert_eq!(calls[0], calls[1]);
}

#[tokio::test]
async fn test_read_only_datapoint_is_rejected() {
    let h = Harness::start(test_config()).await;

    h.message("hm/set/Kitchen Blind/ACTIVITY_STATE", "UP").await;
    h.message("hm/param/ABC1234:1/VALUES/PROCESS", "1").await;

    assert!(h.hmip.calls_to("setValue").is_empty());
    assert!(h.hmip.calls_to("putParamset").is_empty());
}

#[tokio::test]
async fn test_undeclared_datapoint_written_untyped() {
    let h = Harness::start(test_config()).await;

    h.message("hm/set/ABC1234:1/STOP", "true").await;

    assert_eq!(
        h.hmip.calls_to("setValue"),
        vec![vec![RpcValue::from("ABC1234:1"), RpcValue::from("STOP"), RpcValue::from("true")]]
    );
}

#[tokio::test]
async fn test_unknown_device_makes_no_call() {
    let h = Harness::start(test_config()).await;
    h.rfd.clear_calls();
    h.hmip.clear_calls();

    h.message("hm/set/Garage Door/STATE", "true").await;
    h.message("hm/paramset/ZZZ0000:1/VALUES", r#"{"STATE": true}"#).await;

    assert!(h.rfd.calls().is_empty());
    assert!(h.hmip.calls().is_empty());
}

#[tokio::test]
async fn test_param_write() {
    let h = Harness::start(test_config()).await;

    h.message("hm/param/LEQ0001:1/VALUES/LEVEL", "25").await;

    assert_eq!(
        h.rfd.calls_to("putParamset"),
        vec![vec![
            RpcValue::from("LEQ0001:1"),
            RpcValue::from("VALUES"),
            members(&[("LEVEL", RpcValue::Double(25.0))]),
        ]]
    );
}

#[tokio::test]
async fn test_bulk_paramset_write() {
    let h = Harness::start(test_config()).await;

    h.message("hm/paramset/LEQ0001:1/VALUES", r#"{"LEVEL": 50}"#).await;

    assert_eq!(
        h.rfd.calls_to("putParamset"),
        vec![vec![
            RpcValue::from("LEQ0001:1"),
            RpcValue::from("VALUES"),
            members(&[("LEVEL", RpcValue::Double(50.0))]),
        ]]
    );
}

#[tokio::test]
async fn test_bulk_write_skips_read_only_members() {
    let h = Harness::start(test_config()).await;

    h.message(
        "hm/paramset/LEQ0001:1/VALUES",
        r#"{"LEVEL": 101, "WORKING": false, "RAMP_TIME": 2}"#,
    )
    .await;

    assert_eq!(
        h.rfd.calls_to("putParamset"),
        vec![vec![
            RpcValue::from("LEQ0001:1"),
            RpcValue::from("VALUES"),
            members(&[
                ("LEVEL", RpcValue::Double(100.0)),
                ("RAMP_TIME", RpcValue::from("2")),
            ]),
        ]]
    );
}

#[tokio::test]
async fn test_bulk_write_requires_object() {
    let h = Harness::start(test_config()).await;

    h.message("hm/paramset/LEQ0001:1/VALUES", "[50]").await;
    h.message("hm/paramset/LEQ0001:1/VALUES", "50").await;
    h.message("hm/paramset/LEQ0001:1/VALUES", "{broken").await;

    assert!(h.rfd.calls_to("putParamset").is_empty());
}

#[tokio::test]
async fn test_rpc_passthrough_publishes_response() {
    let h = Harness::start(test_config()).await;
    h.hmip.set_response("getValue", RpcValue::Double(0.3));
    h.bus.clear();

    h.message("hm/rpc/hmip/getValue/42", r#"["ABC1234:1", "LEVEL"]"#).await;

    assert_eq!(
        h.hmip.calls_to("getValue"),
        vec![vec![RpcValue::from("ABC1234:1"), RpcValue::from("LEVEL")]]
    );
    let response = h.bus.on_topic("hm/response/42");
    assert_eq!(response.len(), 1);
    assert_eq!(response[0].payload, "0.3");
    assert!(!response[0].retain);
}

#[tokio::test]
async fn test_rpc_passthrough_without_array_payload() {
    let h = Harness::start(test_config()).await;
    h.bus.clear();

    h.message("hm/rpc/rfd/listBidcosInterfaces/7", "").await;
    assert_eq!(h.rfd.calls_to("listBidcosInterfaces"), vec![Vec::<RpcValue>::new()]);
    assert_eq!(h.bus.on_topic("hm/response/7")[0].payload, "\"\"");

    h.rfd.set_error("getValue", RpcError::fault("Unknown instance"));
    h.message("hm/rpc/rfd/getValue/8", r#"["X"]"#).await;
    h.message("hm/rpc/cuxd/getValue/9", "").await;
    assert!(h.bus.on_topic("hm/response/8").is_empty());
    assert!(h.bus.on_topic("hm/response/9").is_empty());
}

#[tokio::test]
async fn test_logic_topics() {
    let h = Harness::start(test_config()).await;

    h.message("hm/rega/Alarm/Armed", "true").await;
    h.message("hm/command/regasync", "").await;

    assert_eq!(
        h.logic.calls(),
        vec![
            LogicCall::Set {
                name: "Alarm/Armed".to_string(),
                payload: "true".to_string()
            },
            LogicCall::Command("regasync".to_string()),
        ]
    );
}

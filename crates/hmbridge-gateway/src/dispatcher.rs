//! Controller callbacks (`event`, `newDevices`, ...) arriving on the RPC servers

use std::sync::Arc;

use async_trait::async_trait;
use hmbridge_conv::{event_payload, is_retained};
use hmbridge_core::topics::{notworking_topic, status_topic};
use hmbridge_core::{DeviceDescriptor, RpcError, RpcHandler, RpcResult, RpcValue};
use tracing::{debug, error, warn};

use crate::connection::interface_name;
use crate::context::GatewayContext;
use crate::error::{GatewayError, GatewayResult};
use crate::registry::EventDescriptor;

/// Datapoints that report whether a channel is still moving
const WORKING_DATAPOINTS: [&str; 2] = ["WORKING", "DIRECTION"];

/// Datapoints that get a `_NOTWORKING` publish once the channel settles
const SETTLING_DATAPOINTS: [&str; 2] = ["LEVEL", "STATE"];

/// Methods the callback servers answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundMethod {
    Multicall,
    ListMethods,
    Event,
    ListDevices,
    NewDevices,
    DeleteDevices,
}

impl InboundMethod {
    pub const SUPPORTED: [InboundMethod; 6] = [
        InboundMethod::Multicall,
        InboundMethod::ListMethods,
        InboundMethod::Event,
        InboundMethod::ListDevices,
        InboundMethod::NewDevices,
        InboundMethod::DeleteDevices,
    ];

    pub fn parse(method: &str) -> Option<Self> {
        Self::SUPPORTED.into_iter().find(|m| m.as_str() == method)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InboundMethod::Multicall => "system.multicall",
            InboundMethod::ListMethods => "system.listMethods",
            InboundMethod::Event => "event",
            InboundMethod::ListDevices => "listDevices",
            InboundMethod::NewDevices => "newDevices",
            InboundMethod::DeleteDevices => "deleteDevices",
        }
    }
}

impl From<GatewayError> for RpcError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Rpc(inner) => inner,
            other => RpcError::fault(other.to_string()),
        }
    }
}

/// [`RpcHandler`] shared by the BIN-RPC and XML-RPC callback servers
pub struct InboundDispatcher {
    ctx: Arc<GatewayContext>,
}

impl InboundDispatcher {
    pub fn new(ctx: Arc<GatewayContext>) -> Self {
        Self { ctx }
    }

    async fn dispatch(&self, method: &str, params: Vec<RpcValue>) -> GatewayResult<RpcValue> {
        match InboundMethod::parse(method) {
            Some(InboundMethod::Multicall) => self.multicall(params).await,
            Some(InboundMethod::ListMethods) => Ok(RpcValue::Array(
                InboundMethod::SUPPORTED
                    .iter()
                    .map(|m| RpcValue::from(m.as_str()))
                    .collect(),
            )),
            Some(other) => self.dispatch_single(other, params).await,
            None => {
                debug!(method, "Method does not exist");
                Ok(empty())
            }
        }
    }

    /// Dispatch a method that may appear inside a multicall
    async fn dispatch_single(
        &self,
        method: InboundMethod,
        params: Vec<RpcValue>,
    ) -> GatewayResult<RpcValue> {
        match method {
            InboundMethod::Event => self.event(&params).await,
            InboundMethod::ListDevices => self.list_devices(&params),
            InboundMethod::NewDevices => self.new_devices(&params).await,
            InboundMethod::DeleteDevices => self.delete_devices(&params).await,
            InboundMethod::Multicall | InboundMethod::ListMethods => {
                debug!(method = method.as_str(), "Not allowed inside multicall");
                Ok(empty())
            }
        }
    }

    /// Run the calls in order, answering `""` for each
    async fn multicall(&self, params: Vec<RpcValue>) -> GatewayResult<RpcValue> {
        let calls = params
            .first()
            .and_then(RpcValue::as_array)
            .ok_or_else(|| GatewayError::invalid_params("system.multicall", "expected array"))?;

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let name = call.get("methodName").and_then(RpcValue::as_str).unwrap_or_default();
            let sub_params = call
                .get("params")
                .and_then(RpcValue::as_array)
                .map(<[RpcValue]>::to_vec)
                .unwrap_or_default();

            match InboundMethod::parse(name) {
                Some(method) => {
                    if let Err(e) = self.dispatch_single(method, sub_params).await {
                        error!(method = name, error = %e, "Multicall entry failed");
                    }
                }
                None => debug!(method = name, "Method does not exist"),
            }
            results.push(empty());
        }
        Ok(RpcValue::Array(results))
    }

    async fn event(&self, params: &[RpcValue]) -> GatewayResult<RpcValue> {
        let client_id = str_param("event", params, 0)?;
        let address = str_param("event", params, 1)?;
        let datapoint = str_param("event", params, 2)?;
        let value = params
            .get(3)
            .ok_or_else(|| GatewayError::invalid_params("event", "missing value"))?;
        let ctx = &self.ctx;
        let interface = interface_name(client_id);

        debug!(interface, address, datapoint, value = ?value, "event");
        let ts = chrono::Utc::now().timestamp_millis();
        if let Some(conn) = ctx.connection(interface) {
            conn.touch();
        }

        if address == "CENTRAL" && datapoint == "PONG" {
            return Ok(empty());
        }

        if WORKING_DATAPOINTS.contains(&datapoint) {
            ctx.working
                .lock()
                .insert(address.to_string(), value.is_truthy());
        }

        if ctx.config.poll_trigger_parts() == Some((address, datapoint)) {
            let logic = Arc::clone(&ctx.logic);
            tokio::spawn(async move { logic.trigger_poll().await });
        }

        let lc = ctx.values.record(address, datapoint, value, ts);

        let Some(device) = ctx.registry.device(interface, address) else {
            error!(interface, address, "Unknown device");
            return Ok(empty());
        };

        let lookup = ctx
            .registry
            .event_descriptor(&device.paramset_type_key(), datapoint);
        match &lookup {
            EventDescriptor::Found(_) => {}
            EventDescriptor::NoDescriptor(key) => {
                error!(type_key = %key, "Unknown paramset description")
            }
            EventDescriptor::NoValues(key) => {
                error!(type_key = %key, "Missing VALUES in paramset description")
            }
            EventDescriptor::NoDatapoint(key) => {
                error!(type_key = %key, datapoint, "Missing datapoint in paramset description")
            }
        }
        let desc = lookup.descriptor();

        let topic = status_topic(&ctx.config.name, &ctx.display_name(address), datapoint);
        let payload = event_payload(address, value, desc, ts, lc).to_json_string();
        let retain = is_retained(ctx.config.retain, desc);
        ctx.publish(&topic, payload.clone(), retain).await;

        let has_working_flag = ctx.working.lock().contains_key(address);
        if has_working_flag && SETTLING_DATAPOINTS.contains(&datapoint) {
            let ctx = Arc::clone(&self.ctx);
            let channel = address.to_string();
            self.ctx.notworking_timers.schedule(
                address.to_string(),
                self.ctx.config.notworking_delay,
                async move {
                    let working = ctx.working.lock().get(&channel).copied().unwrap_or(false);
                    if !working {
                        ctx.publish(&notworking_topic(&topic), payload, retain).await;
                    }
                },
            );
        }

        Ok(empty())
    }

    fn list_devices(&self, params: &[RpcValue]) -> GatewayResult<RpcValue> {
        let interface = interface_name(str_param("listDevices", params, 0)?);
        let summaries = self.ctx.registry.summaries(interface);
        debug!(interface, count = summaries.len(), "listDevices");
        self.ctx.schedule_rebuild(interface);
        Ok(RpcValue::Array(summaries))
    }

    async fn new_devices(&self, params: &[RpcValue]) -> GatewayResult<RpcValue> {
        let interface = interface_name(str_param("newDevices", params, 0)?);
        let entries = array_param("newDevices", params, 1)?;
        self.ctx.rebuild_timers.cancel(&interface.to_string());

        let mut devices = Vec::with_capacity(entries.len());
        for entry in entries {
            match DeviceDescriptor::from_rpc(entry) {
                Ok(desc) => devices.push(desc),
                Err(e) => warn!(interface, error = %e, "Skipping malformed device description"),
            }
        }
        debug!(interface, count = devices.len(), "newDevices");
        self.ctx.registry.upsert_devices(interface, devices);
        self.ctx.persist_devices(interface).await;
        self.ctx.schedule_rebuild(interface);
        Ok(empty())
    }

    async fn delete_devices(&self, params: &[RpcValue]) -> GatewayResult<RpcValue> {
        let interface = interface_name(str_param("deleteDevices", params, 0)?);
        let addresses: Vec<String> = array_param("deleteDevices", params, 1)?
            .iter()
            .filter_map(|a| a.as_str().map(str::to_string))
            .collect();
        self.ctx.rebuild_timers.cancel(&interface.to_string());

        debug!(interface, count = addresses.len(), "deleteDevices");
        self.ctx.registry.remove_devices(interface, &addresses);
        self.ctx.persist_devices(interface).await;
        self.ctx.schedule_rebuild(interface);
        Ok(empty())
    }
}

#[async_trait]
impl RpcHandler for InboundDispatcher {
    async fn handle(&self, method: &str, params: Vec<RpcValue>) -> RpcResult<RpcValue> {
        self.dispatch(method, params).await.map_err(|e| {
            error!(method, error = %e, "Callback rejected");
            RpcError::from(e)
        })
    }
}

fn empty() -> RpcValue {
    RpcValue::String(String::new())
}

fn str_param<'a>(method: &str, params: &'a [RpcValue], index: usize) -> GatewayResult<&'a str> {
    params
        .get(index)
        .and_then(RpcValue::as_str)
        .ok_or_else(|| GatewayError::invalid_params(method, format!("parameter {} must be a string", index)))
}

fn array_param<'a>(
    method: &str,
    params: &'a [RpcValue],
    index: usize,
) -> GatewayResult<&'a [RpcValue]> {
    params
        .get(index)
        .and_then(RpcValue::as_array)
        .ok_or_else(|| GatewayError::invalid_params(method, format!("parameter {} must be an array", index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        for method in InboundMethod::SUPPORTED {
            assert_eq!(InboundMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(InboundMethod::parse("setReadyConfig"), None);
        assert_eq!(InboundMethod::parse("Event"), None);
    }

    #[test]
    fn test_gateway_error_becomes_fault() {
        let err = RpcError::from(GatewayError::invalid_params("event", "missing value"));
        assert!(matches!(err, RpcError::Fault { code: -1, .. }));

        let err = RpcError::from(GatewayError::Rpc(RpcError::NotConnected));
        assert_eq!(err, RpcError::NotConnected);
    }
}

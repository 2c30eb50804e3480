//! Bus command topics → RPC calls

use std::collections::BTreeMap;
use std::sync::Arc;

use hmbridge_conv::{check_write, coerce_payload, parse_bulk_payload, stringify_value, ConvError, WriteCheck};
use hmbridge_core::topics::response_topic;
use hmbridge_core::{DatapointDescriptor, DeviceDescriptor, RpcValue};
use tracing::{debug, error, warn};

use crate::context::GatewayContext;
use crate::error::{GatewayError, GatewayResult};
use crate::registry::VALUES_PARAMSET;

/// A parsed command topic
///
/// Channel segments may themselves contain `/`; everything between the verb
/// and the trailing fixed segments is joined back together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicCommand {
    /// `{name}/set/<channel…>/<datapoint>`
    Set { channel: String, datapoint: String },
    /// `{name}/param/<channel…>/<paramset>/<datapoint>`
    Param {
        channel: String,
        paramset: String,
        datapoint: String,
    },
    /// `{name}/paramset/<channel…>/<paramset>`
    Paramset { channel: String, paramset: String },
    /// `{name}/rpc/<interface>/<method>/<callId>`
    Rpc {
        interface: String,
        method: String,
        call_id: String,
    },
    /// `{name}/rega/<name…>`
    Rega { name: String },
    /// `{name}/command/<command>`
    Command { name: String },
}

impl TopicCommand {
    /// Parse a topic under the gateway's `name`
    ///
    /// ```
    /// # use hmbridge_gateway::router::TopicCommand;
    /// let cmd = TopicCommand::parse("hm", "hm/set/Kitchen/Blind/LEVEL");
    /// assert_eq!(cmd, Some(TopicCommand::Set {
    ///     channel: "Kitchen/Blind".to_string(),
    ///     datapoint: "LEVEL".to_string(),
    /// }));
    /// assert_eq!(TopicCommand::parse("hm", "hm/set/LEVEL"), None);
    /// ```
    pub fn parse(name: &str, topic: &str) -> Option<Self> {
        let rest = topic.strip_prefix(name)?.strip_prefix('/')?;
        let parts: Vec<&str> = rest.split('/').collect();
        let (verb, args) = parts.split_first()?;
        let n = args.len();

        match *verb {
            "set" if n >= 2 => Some(TopicCommand::Set {
                channel: args[..n - 1].join("/"),
                datapoint: args[n - 1].to_string(),
            }),
            "param" if n >= 3 => Some(TopicCommand::Param {
                channel: args[..n - 2].join("/"),
                paramset: args[n - 2].to_string(),
                datapoint: args[n - 1].to_string(),
            }),
            "paramset" if n >= 2 => Some(TopicCommand::Paramset {
                channel: args[..n - 1].join("/"),
                paramset: args[n - 1].to_string(),
            }),
            "rpc" if n == 3 => Some(TopicCommand::Rpc {
                interface: args[0].to_string(),
                method: args[1].to_string(),
                call_id: args[2].to_string(),
            }),
            "rega" if n >= 1 => Some(TopicCommand::Rega {
                name: args.join("/"),
            }),
            "command" if n >= 1 => Some(TopicCommand::Command {
                name: args[0].to_string(),
            }),
            _ => None,
        }
    }
}

/// Handle one bus message; failures are logged here
pub async fn route(ctx: &Arc<GatewayContext>, topic: &str, payload: &str) {
    debug!(topic, payload, "Bus message");
    let Some(command) = TopicCommand::parse(&ctx.config.name, topic) else {
        error!(topic, payload, "Unhandled topic");
        return;
    };
    if let Err(e) = execute(ctx, command, payload).await {
        error!(topic, error = %e, "Command failed");
    }
}

async fn execute(ctx: &Arc<GatewayContext>, command: TopicCommand, payload: &str) -> GatewayResult<()> {
    match command {
        TopicCommand::Set { channel, datapoint } => {
            let target = WriteTarget::resolve(ctx, &channel)?;
            let desc = target.datapoint(ctx, VALUES_PARAMSET, &datapoint)?;
            let value = coerce_payload(payload, desc.as_ref());
            target
                .call(ctx, "setValue", vec![target.address(), datapoint.into(), value])
                .await
        }
        TopicCommand::Param {
            channel,
            paramset,
            datapoint,
        } => {
            let target = WriteTarget::resolve(ctx, &channel)?;
            let desc = target.datapoint(ctx, &paramset, &datapoint)?;
            let mut members = BTreeMap::new();
            members.insert(datapoint, coerce_payload(payload, desc.as_ref()));
            target
                .call(
                    ctx,
                    "putParamset",
                    vec![target.address(), paramset.into(), RpcValue::Struct(members)],
                )
                .await
        }
        TopicCommand::Paramset { channel, paramset } => {
            let target = WriteTarget::resolve(ctx, &channel)?;
            let members = bulk_members(ctx, &target, &paramset, payload)?;
            target
                .call(
                    ctx,
                    "putParamset",
                    vec![target.address(), paramset.into(), RpcValue::Struct(members)],
                )
                .await
        }
        TopicCommand::Rpc {
            interface,
            method,
            call_id,
        } => passthrough(ctx, &interface, &method, &call_id, payload).await,
        TopicCommand::Rega { name } => {
            ctx.logic.set(&name, payload).await;
            Ok(())
        }
        TopicCommand::Command { name } => {
            ctx.logic.command(&name).await;
            Ok(())
        }
    }
}

/// The device a write is addressed to
struct WriteTarget {
    interface: String,
    device: DeviceDescriptor,
}

impl WriteTarget {
    fn resolve(ctx: &GatewayContext, channel: &str) -> GatewayResult<Self> {
        let address = ctx.resolve_address(channel);
        let (interface, device) = ctx
            .registry
            .locate(&address)
            .ok_or(GatewayError::UnknownDevice(address))?;
        Ok(Self { interface, device })
    }

    fn address(&self) -> RpcValue {
        RpcValue::from(self.device.address.as_str())
    }

    /// Descriptor of a datapoint, rejecting declared read-only ones
    fn datapoint(
        &self,
        ctx: &GatewayContext,
        paramset: &str,
        datapoint: &str,
    ) -> GatewayResult<Option<DatapointDescriptor>> {
        let key = self.device.paramset_type_key();
        let desc = ctx.registry.datapoint(&key, paramset, datapoint);
        match check_write(desc.as_ref()) {
            WriteCheck::Allowed => Ok(desc),
            WriteCheck::Unknown => {
                warn!(type_key = %key, paramset, datapoint, "Unknown datapoint, writing untyped");
                Ok(None)
            }
            WriteCheck::Denied => Err(self.not_writeable(paramset, datapoint)),
        }
    }

    fn not_writeable(&self, paramset: &str, datapoint: &str) -> GatewayError {
        GatewayError::NotWriteable {
            address: self.device.address.clone(),
            paramset: paramset.to_string(),
            datapoint: datapoint.to_string(),
        }
    }

    async fn call(&self, ctx: &GatewayContext, method: &str, params: Vec<RpcValue>) -> GatewayResult<()> {
        let conn = ctx
            .connection(&self.interface)
            .ok_or_else(|| GatewayError::UnknownInterface(self.interface.clone()))?;
        debug!(interface = %self.interface, method, params = ?params, "RPC write");
        conn.client().call(method, params).await?;
        Ok(())
    }
}

/// Coerce the members of a bulk paramset write
///
/// Declared read-only members are dropped with an error; the rest of the
/// object is still written.
fn bulk_members(
    ctx: &GatewayContext,
    target: &WriteTarget,
    paramset: &str,
    payload: &str,
) -> GatewayResult<BTreeMap<String, RpcValue>> {
    let key = target.device.paramset_type_key();
    let descriptors = ctx.registry.paramset(&key, paramset);
    if descriptors.is_none() {
        warn!(type_key = %key, paramset, "Unknown paramset, writing untyped");
    }
    let object = parse_bulk_payload(payload)?;

    let mut members = BTreeMap::new();
    for (datapoint, value) in &object {
        let desc = descriptors.as_ref().and_then(|ps| ps.get(datapoint));
        if !check_write(desc).is_permitted() {
            error!(error = %target.not_writeable(paramset, datapoint), "Skipping member");
            continue;
        }
        members.insert(
            datapoint.clone(),
            coerce_payload(&stringify_value(value), desc),
        );
    }
    Ok(members)
}

/// Forward a raw RPC call and publish its result to `{name}/response/<callId>`
async fn passthrough(
    ctx: &GatewayContext,
    interface: &str,
    method: &str,
    call_id: &str,
    payload: &str,
) -> GatewayResult<()> {
    let conn = ctx
        .connection(interface)
        .ok_or_else(|| GatewayError::UnknownInterface(interface.to_string()))?;

    let params = if payload.starts_with('[') {
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(serde_json::Value::Array(items)) => items.iter().map(RpcValue::from_json).collect(),
            Ok(_) => Vec::new(),
            Err(e) => return Err(ConvError::InvalidJson(e.to_string()).into()),
        }
    } else {
        Vec::new()
    };

    debug!(interface, method, params = ?params, "RPC passthrough");
    let result = conn.client().call(method, params).await?;
    ctx.publish(
        &response_topic(&ctx.config.name, call_id),
        result.to_json().to_string(),
        false,
    )
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_segment_counts() {
        assert_eq!(
            TopicCommand::parse("hm", "hm/param/ABC1234:1/MASTER/LEVEL_OFFSET"),
            Some(TopicCommand::Param {
                channel: "ABC1234:1".to_string(),
                paramset: "MASTER".to_string(),
                datapoint: "LEVEL_OFFSET".to_string(),
            })
        );
        assert_eq!(TopicCommand::parse("hm", "hm/param/ABC1234:1/LEVEL"), None);
        assert_eq!(
            TopicCommand::parse("hm", "hm/paramset/ABC1234:1/VALUES"),
            Some(TopicCommand::Paramset {
                channel: "ABC1234:1".to_string(),
                paramset: "VALUES".to_string(),
            })
        );
        assert_eq!(
            TopicCommand::parse("hm", "hm/rpc/hmip/getValue/17"),
            Some(TopicCommand::Rpc {
                interface: "hmip".to_string(),
                method: "getValue".to_string(),
                call_id: "17".to_string(),
            })
        );
        assert_eq!(TopicCommand::parse("hm", "hm/rpc/hmip/getValue/17/x"), None);
        assert_eq!(TopicCommand::parse("hm", "hm/rpc/hmip/getValue"), None);
    }

    #[test]
    fn test_parse_logic_topics() {
        assert_eq!(
            TopicCommand::parse("hm", "hm/rega/Alarm/Armed"),
            Some(TopicCommand::Rega {
                name: "Alarm/Armed".to_string()
            })
        );
        assert_eq!(
            TopicCommand::parse("hm", "hm/command/regasync"),
            Some(TopicCommand::Command {
                name: "regasync".to_string()
            })
        );
        assert_eq!(TopicCommand::parse("hm", "hm/command"), None);
    }

    #[test]
    fn test_parse_requires_name_prefix() {
        assert_eq!(TopicCommand::parse("hm", "ccu/set/A:1/STATE"), None);
        assert_eq!(TopicCommand::parse("hm", "hmx/set/A:1/STATE"), None);
        assert_eq!(TopicCommand::parse("hm", "hm/status/A:1/STATE"), None);
    }
}

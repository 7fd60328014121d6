//! `fleetproto`: the JSON message vocabulary shared between the fleet
//! coordination server and its game-client agents.
//!
//! Agents speak JSON text frames over a persistent websocket. Payload keys
//! are the Chinese field names the clients emit; the structs here carry the
//! serde renames so the rest of the server works with plain Rust names.
//!
//! Inbound frames carry no type tag. [`classify`] discriminates on key
//! presence, in a fixed order, and hands back a typed payload.

pub mod push;
pub mod report;

use serde_json::Value;

use report::{ConfirmPayload, CoordPayload, DailyTaskMessage, RoleAttributes};

pub const MSG_HEARTBEAT: &str = "heartbeat";
pub const MSG_HEARTBEAT_RESPONSE: &str = "heartbeat_response";
pub const MSG_CONNECTION_ACK: &str = "connection_ack";
pub const MSG_DAILY_TASK: &str = "日常任务";

pub const TASK_START: &str = "开始";
pub const TASK_FINISH: &str = "完成";
pub const TASK_ALLOW: &str = "允许";
pub const TASK_WAIT: &str = "等待";

pub const OP_TRANSFER: &str = "装备转移";
pub const OP_RECEIVE: &str = "装备接收";
pub const STATUS_OK: &str = "成功";

/// A classified inbound frame.
#[derive(Debug)]
pub enum Inbound {
    /// `{type:"heartbeat_response", ...}` — resets the connection's timer.
    HeartbeatResponse,
    /// `{status:"received"}` — generic acknowledgement, logged only.
    Ack,
    DailyTask(DailyTaskMessage),
    /// Exchange confirmation; the engine matches it against every zone.
    Confirm(ConfirmPayload),
    /// In-world rendezvous coordinates, forwarded to the item owner.
    Coordinate(CoordPayload),
    /// Anything else is a role attribute report.
    Role(Box<RoleAttributes>),
}

/// Classify a raw text frame.
///
/// Discrimination order (first match wins):
/// 1. `type == "heartbeat_response"`
/// 2. `status == "received"`
/// 3. `消息类型 == "日常任务"`
/// 4. `操作` present
/// 5. `地图`, `X`, `Y`, `来源角色` all present
/// 6. otherwise a role attribute report
///
/// Returns `None` when the frame is not a JSON object or the matched
/// payload fails to decode; such frames are dropped by the caller.
pub fn classify(raw: &str) -> Option<Inbound> {
    let v: Value = serde_json::from_str(raw).ok()?;
    if !v.is_object() {
        return None;
    }

    if v.get("type").and_then(Value::as_str) == Some(MSG_HEARTBEAT_RESPONSE) {
        return Some(Inbound::HeartbeatResponse);
    }
    if v.get("status").and_then(Value::as_str) == Some("received") {
        return Some(Inbound::Ack);
    }
    if v.get("消息类型").and_then(Value::as_str) == Some(MSG_DAILY_TASK) {
        let m = serde_json::from_value(v).ok()?;
        return Some(Inbound::DailyTask(m));
    }
    if v.get("操作").and_then(Value::as_str).is_some() {
        let c = serde_json::from_value(v).ok()?;
        return Some(Inbound::Confirm(c));
    }
    if v.get("地图").and_then(Value::as_str).is_some()
        && v.get("X").is_some()
        && v.get("Y").is_some()
        && v.get("来源角色").is_some()
    {
        let c = serde_json::from_value(v).ok()?;
        return Some(Inbound::Coordinate(c));
    }
    let r = serde_json::from_value(v).ok()?;
    Some(Inbound::Role(Box::new(r)))
}

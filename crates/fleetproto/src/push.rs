//! Outbound directives: everything the server pushes to an agent.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ConnectionAck {
    pub code: u16,
    // Capital M on the wire; clients read the status string from "Message".
    #[serde(rename = "Message")]
    pub message: &'static str,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub client_id: String,
}

#[derive(Debug, Serialize)]
pub struct Heartbeat {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub client_id: String,
}

/// Map assignment push. 层数 is present only for mage characters.
#[derive(Debug, Serialize)]
pub struct MapAssignment {
    #[serde(rename = "角色名")]
    pub role_name: String,
    pub data: MapAssignmentData,
    pub client_id: String,
}

#[derive(Debug, Serialize)]
pub struct MapAssignmentData {
    #[serde(rename = "地图")]
    pub map: String,
    #[serde(rename = "层数", skip_serializing_if = "Option::is_none")]
    pub floor: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TaskStatus {
    #[serde(rename = "角色名")]
    pub role_name: String,
    #[serde(rename = "充值区服")]
    pub zone: String,
    #[serde(rename = "消息类型")]
    pub msg_type: &'static str,
    #[serde(rename = "任务状态")]
    pub task_status: String,
    pub client_id: String,
}

/// Sent to the item owner: hand 装备名称 over to 目标角色.
#[derive(Debug, Serialize)]
pub struct ExchangeToOwner {
    #[serde(rename = "角色名")]
    pub role_name: String,
    #[serde(rename = "目标角色")]
    pub target_role: String,
    #[serde(rename = "装备名称")]
    pub item: String,
    pub client_id: String,
}

/// Sent to the receiver: expect 装备名称 from 来源角色.
#[derive(Debug, Serialize)]
pub struct ExchangeToReceiver {
    #[serde(rename = "角色名")]
    pub role_name: String,
    #[serde(rename = "来源角色")]
    pub from_role: String,
    #[serde(rename = "装备名称")]
    pub item: String,
    pub client_id: String,
}

/// Pushed to both parties once both sides confirmed.
#[derive(Debug, Serialize)]
pub struct ExchangeDone {
    #[serde(rename = "角色名")]
    pub role_name: String,
    #[serde(rename = "交换伙伴")]
    pub partner: String,
    #[serde(rename = "装备名称")]
    pub item: String,
    #[serde(rename = "状态")]
    pub status: &'static str,
    pub client_id: String,
}

#[derive(Debug, Serialize)]
pub struct CoordForward {
    #[serde(rename = "角色名")]
    pub role_name: String,
    #[serde(rename = "地图")]
    pub map: String,
    #[serde(rename = "X")]
    pub x: i64,
    #[serde(rename = "Y")]
    pub y: i64,
    pub client_id: String,
}

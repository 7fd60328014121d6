//! Inbound payloads: everything an agent reports to the server.

use serde::{Deserialize, Serialize};

/// One equipped item, as the client reports it. Slot names are loose
/// (e.g. 道靴/法靴 for 鞋子); the server normalizes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipItem {
    #[serde(rename = "部位", default)]
    pub slot: String,
    #[serde(rename = "装备名", default)]
    pub name: String,
}

/// A stacked item in the backpack or warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashItem {
    #[serde(rename = "物品名字", default)]
    pub name: String,
    #[serde(rename = "物品数量", default)]
    pub count: i64,
    #[serde(rename = "物品等级", default)]
    pub item_level: i64,
    #[serde(rename = "强化等级", default)]
    pub enhance: i64,
    #[serde(rename = "淬炼等级", default)]
    pub refine: i64,
}

/// Full character attribute report. Every field defaults so partial
/// reports still decode; the registry drops reports with an empty zone or
/// role name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleAttributes {
    #[serde(rename = "当前所在地图", default)]
    pub map_name: String,
    #[serde(rename = "角色名", default)]
    pub role_name: String,
    #[serde(rename = "充值区服", default)]
    pub zone: String,
    #[serde(rename = "合区", default)]
    pub merge_state: String,
    #[serde(rename = "职业", default)]
    pub class: String,
    #[serde(rename = "流派", default)]
    pub school: String,
    #[serde(rename = "技能", default)]
    pub skill: i64,
    #[serde(rename = "等级", default)]
    pub level: i64,
    #[serde(rename = "幸运", default)]
    pub lucky: i64,
    #[serde(rename = "道术", default)]
    pub magic: i64,
    #[serde(rename = "金币", default)]
    pub gold: i64,
    #[serde(rename = "元宝", default)]
    pub yuanbao: i64,
    #[serde(rename = "血量", default)]
    pub hp: i64,
    #[serde(rename = "client_id", default)]
    pub client_id: String,
    #[serde(rename = "创角时间", default)]
    pub created_at: String,
    #[serde(rename = "X", default)]
    pub x: i64,
    #[serde(rename = "Y", default)]
    pub y: i64,
    #[serde(rename = "装备信息", default)]
    pub equipments: Vec<EquipItem>,
    #[serde(rename = "背包信息", default)]
    pub backpack: Vec<StashItem>,
    #[serde(rename = "仓库信息", default)]
    pub warehouse: Vec<StashItem>,
}

/// Daily-task admission request / completion notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyTaskMessage {
    #[serde(rename = "角色名", default)]
    pub role_name: String,
    #[serde(rename = "充值区服", default)]
    pub zone: String,
    #[serde(rename = "消息类型", default)]
    pub msg_type: String,
    #[serde(rename = "任务状态", default)]
    pub task_status: String,
    #[serde(rename = "client_id", default)]
    pub client_id: String,
}

/// Exchange confirmation: 操作 is 装备转移 (owner side) or 装备接收
/// (receiver side); only 状态 == 成功 advances the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPayload {
    #[serde(rename = "角色名", default)]
    pub role_name: String,
    #[serde(rename = "操作", default)]
    pub op: String,
    #[serde(rename = "装备名称", default)]
    pub item: String,
    #[serde(rename = "状态", default)]
    pub status: String,
    #[serde(rename = "client_id", default)]
    pub client_id: String,
}

/// Rendezvous coordinates reported by the receiving party, forwarded to
/// the owner's connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordPayload {
    #[serde(rename = "角色名", default)]
    pub role_name: String,
    #[serde(rename = "来源角色", default)]
    pub from_role: String,
    #[serde(rename = "地图", default)]
    pub map: String,
    #[serde(rename = "X", default)]
    pub x: i64,
    #[serde(rename = "Y", default)]
    pub y: i64,
    #[serde(rename = "client_id", default)]
    pub client_id: String,
}

//! Two-party equipment transfers: compute per-role demand against the
//! zone's equipment plan, pair each needed item with a current holder,
//! and drive the confirm handshake to completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use fleetproto::push::{CoordForward, ExchangeDone, ExchangeToOwner, ExchangeToReceiver};
use fleetproto::report::{ConfirmPayload, CoordPayload};
use fleetproto::{OP_RECEIVE, OP_TRANSFER, STATUS_OK};

use crate::db::Db;
use crate::eventlog::{EventLog, Stream};
use crate::outbound::Outbound;
use crate::outfit;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    pub zone: String,
    pub owner: String,
    pub receiver: String,
    pub item: String,
}

#[derive(Debug, Clone, Copy)]
struct ExchangeState {
    owner_ok: bool,
    receiver_ok: bool,
    #[allow(dead_code)]
    created: Instant,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Owner,
    Receiver,
}

pub struct ExchangeEngine {
    states: Mutex<HashMap<ExchangeKey, ExchangeState>>,
    db: Db,
    outbound: Outbound,
    registry: Arc<Registry>,
    log: Arc<EventLog>,
}

impl ExchangeEngine {
    pub fn new(db: Db, outbound: Outbound, registry: Arc<Registry>, log: Arc<EventLog>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            db,
            outbound,
            registry,
            log,
        }
    }

    /// Plan target outfits for the zone and open an exchange for every
    /// item a role needs but does not hold.
    pub async fn plan_and_dispatch(&self, zone: &str) {
        let snap = self.registry.snapshot(zone);
        if snap.is_empty() {
            return;
        }
        let plan = outfit::plan_zone(&snap);

        // item -> holders, one entry per copy.
        let mut holders: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut role_names: Vec<&String> = snap.roles.keys().collect();
        role_names.sort();
        for name in &role_names {
            let r = &snap.roles[*name];
            for e in &r.equipments {
                holders.entry(&e.name).or_default().push(&r.role_name);
            }
            for it in &r.backpack {
                for _ in 0..it.count {
                    holders.entry(&it.name).or_default().push(&r.role_name);
                }
            }
            for it in &r.warehouse {
                for _ in 0..it.count {
                    holders.entry(&it.name).or_default().push(&r.role_name);
                }
            }
        }

        for receiver in &role_names {
            let Some(of) = plan.get(*receiver) else { continue };

            let mut need: HashMap<&str, i64> = HashMap::new();
            for name in of.item_names() {
                *need.entry(name).or_insert(0) += 1;
            }
            let r = &snap.roles[*receiver];
            let mut have: HashMap<&str, i64> = HashMap::new();
            for e in &r.equipments {
                *have.entry(e.name.as_str()).or_insert(0) += 1;
            }
            for it in r.backpack.iter().chain(r.warehouse.iter()) {
                *have.entry(it.name.as_str()).or_insert(0) += it.count;
            }
            for (name, n) in need.iter_mut() {
                if let Some(h) = have.get(name) {
                    *n -= (*n).min(*h);
                }
            }

            let mut wanted: Vec<(&str, i64)> =
                need.into_iter().filter(|(_, n)| *n > 0).collect();
            wanted.sort();
            for (item, n) in wanted {
                for _ in 0..n {
                    let owner = {
                        let list = holders.entry(item).or_default();
                        let pos = list.iter().position(|o| *o != receiver.as_str());
                        pos.map(|i| list.remove(i))
                    };
                    let Some(owner) = owner else { continue };
                    let ocid = snap.client_by_role.get(owner).cloned().unwrap_or_default();
                    let rcid = snap
                        .client_by_role
                        .get(receiver.as_str())
                        .cloned()
                        .unwrap_or_default();
                    if ocid.is_empty() || rcid.is_empty() {
                        continue;
                    }
                    self.outbound.send_json(
                        &ocid,
                        &ExchangeToOwner {
                            role_name: owner.to_string(),
                            target_role: receiver.to_string(),
                            item: item.to_string(),
                            client_id: ocid.clone(),
                        },
                    );
                    self.outbound.send_json(
                        &rcid,
                        &ExchangeToReceiver {
                            role_name: receiver.to_string(),
                            from_role: owner.to_string(),
                            item: item.to_string(),
                            client_id: rcid.clone(),
                        },
                    );
                    self.start_exchange(zone, owner, receiver, item).await;
                    self.log.log(
                        Stream::Equipment,
                        &format!(
                            "dispatch exchange zone={zone} owner={owner} receiver={receiver} item={item}"
                        ),
                    );
                }
            }
        }
    }

    async fn start_exchange(&self, zone: &str, owner: &str, receiver: &str, item: &str) {
        let key = ExchangeKey {
            zone: zone.to_string(),
            owner: owner.to_string(),
            receiver: receiver.to_string(),
            item: item.to_string(),
        };
        {
            let mut states = self.states.lock().expect("exchange lock");
            if states.contains_key(&key) {
                return;
            }
            states.insert(
                key,
                ExchangeState {
                    owner_ok: false,
                    receiver_ok: false,
                    created: Instant::now(),
                },
            );
        }
        self.db.insert_exchange(zone, owner, receiver, item).await;
    }

    /// A confirmation applies to this zone if a live record matches the
    /// confirming role and item; the hub fans confirms across all zones.
    pub async fn handle_confirm(&self, zone: &str, p: &ConfirmPayload) {
        if p.status != STATUS_OK {
            return;
        }
        let key = {
            let states = self.states.lock().expect("exchange lock");
            states
                .keys()
                .find(|k| {
                    k.zone == zone
                        && k.item == p.item
                        && (k.owner == p.role_name || k.receiver == p.role_name)
                })
                .cloned()
        };
        let Some(key) = key else { return };

        if p.role_name == key.owner && p.op == OP_TRANSFER {
            self.mark(&key, Side::Owner).await;
        } else if p.role_name == key.receiver && p.op == OP_RECEIVE {
            self.mark(&key, Side::Receiver).await;
        }
    }

    async fn mark(&self, key: &ExchangeKey, side: Side) {
        let done = {
            let mut states = self.states.lock().expect("exchange lock");
            let st = states.entry(key.clone()).or_insert(ExchangeState {
                owner_ok: false,
                receiver_ok: false,
                created: Instant::now(),
            });
            match side {
                Side::Owner => st.owner_ok = true,
                Side::Receiver => st.receiver_ok = true,
            }
            let done = st.owner_ok && st.receiver_ok;
            if done {
                states.remove(key);
            }
            done
        };

        let status = match side {
            Side::Owner => "owner_ok",
            Side::Receiver => "receiver_ok",
        };
        self.db
            .set_exchange_status(&key.zone, &key.owner, &key.receiver, &key.item, status)
            .await;

        if done {
            self.db
                .set_exchange_status(&key.zone, &key.owner, &key.receiver, &key.item, "done")
                .await;

            let snap = self.registry.snapshot(&key.zone);
            let ocid = snap.client_by_role.get(&key.owner).cloned().unwrap_or_default();
            let rcid = snap
                .client_by_role
                .get(&key.receiver)
                .cloned()
                .unwrap_or_default();
            self.outbound.send_json(
                &ocid,
                &ExchangeDone {
                    role_name: key.owner.clone(),
                    partner: key.receiver.clone(),
                    item: key.item.clone(),
                    status: "交换成功",
                    client_id: ocid.clone(),
                },
            );
            self.outbound.send_json(
                &rcid,
                &ExchangeDone {
                    role_name: key.receiver.clone(),
                    partner: key.owner.clone(),
                    item: key.item.clone(),
                    status: "交换成功",
                    client_id: rcid.clone(),
                },
            );
            self.log.log(
                Stream::Equipment,
                &format!(
                    "zone={} role={} equip_change: {} -> (已转出)",
                    key.zone, key.owner, key.item
                ),
            );
            self.log.log(
                Stream::Equipment,
                &format!(
                    "zone={} role={} equip_change: (获得) <- {}",
                    key.zone, key.receiver, key.item
                ),
            );
        }
    }

    /// Forward rendezvous coordinates to the item owner's connection.
    pub fn handle_coordinate(&self, zone: &str, p: &CoordPayload) {
        let cid = match self.registry.client_of(zone, &p.from_role) {
            Some(cid) if !cid.is_empty() => cid,
            _ => return,
        };
        self.outbound.send_json(
            &cid,
            &CoordForward {
                role_name: p.role_name.clone(),
                map: p.map.clone(),
                x: p.x,
                y: p.y,
                client_id: cid.clone(),
            },
        );
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetproto::report::{RoleAttributes, StashItem};

    fn setup() -> (ExchangeEngine, Outbound, Arc<Registry>) {
        let dir = std::env::temp_dir().join(format!("fleetd-exchange-{}", std::process::id()));
        let log = Arc::new(EventLog::new(dir).unwrap());
        let registry = Arc::new(Registry::new(log.clone()));
        let outbound = Outbound::new();
        let engine = ExchangeEngine::new(Db::disabled(), outbound.clone(), registry.clone(), log);
        (engine, outbound, registry)
    }

    fn confirm(role: &str, op: &str, item: &str) -> ConfirmPayload {
        ConfirmPayload {
            role_name: role.to_string(),
            op: op.to_string(),
            item: item.to_string(),
            status: STATUS_OK.to_string(),
            client_id: String::new(),
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(s) = rx.try_recv() {
            out.push(serde_json::from_str(&s).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn dispatch_then_round_trip() {
        let (engine, outbound, registry) = setup();
        let mut orx = outbound.register("C-O");
        let mut rrx = outbound.register("C-R");

        // Owner holds a full 圣战 four-piece; receiver is 天尊 school so
        // the plan hands the pieces to them.
        registry
            .upsert(RoleAttributes {
                zone: "一区".into(),
                role_name: "持有者".into(),
                client_id: "C-O".into(),
                class: "战士".into(),
                backpack: ["圣战头盔", "圣战项链", "圣战腰带", "圣战战靴"]
                    .iter()
                    .map(|n| StashItem {
                        name: n.to_string(),
                        count: 1,
                        item_level: 0,
                        enhance: 0,
                        refine: 0,
                    })
                    .collect(),
                ..Default::default()
            })
            .unwrap();
        registry
            .upsert(RoleAttributes {
                zone: "一区".into(),
                role_name: "接收者".into(),
                client_id: "C-R".into(),
                class: "道士".into(),
                school: "天尊".into(),
                magic: 500,
                ..Default::default()
            })
            .unwrap();

        engine.plan_and_dispatch("一区").await;
        assert_eq!(engine.pending(), 4);

        let owner_msgs = drain(&mut orx);
        assert_eq!(owner_msgs.len(), 4);
        assert!(owner_msgs.iter().all(|m| m["目标角色"] == "接收者"));
        let recv_msgs = drain(&mut rrx);
        assert_eq!(recv_msgs.len(), 4);
        assert!(recv_msgs.iter().all(|m| m["来源角色"] == "持有者"));

        // Owner confirms first: record survives in owner_ok.
        engine
            .handle_confirm("一区", &confirm("持有者", OP_TRANSFER, "圣战头盔"))
            .await;
        assert_eq!(engine.pending(), 4);
        assert!(drain(&mut orx).is_empty());

        // Receiver confirms: both sides get the success push, record gone.
        engine
            .handle_confirm("一区", &confirm("接收者", OP_RECEIVE, "圣战头盔"))
            .await;
        assert_eq!(engine.pending(), 3);

        let done_o = drain(&mut orx);
        assert_eq!(done_o.len(), 1);
        assert_eq!(done_o[0]["状态"], "交换成功");
        assert_eq!(done_o[0]["交换伙伴"], "接收者");
        let done_r = drain(&mut rrx);
        assert_eq!(done_r.len(), 1);
        assert_eq!(done_r[0]["装备名称"], "圣战头盔");
    }

    #[tokio::test]
    async fn confirm_order_is_symmetric() {
        let (engine, _outbound, _registry) = setup();
        engine.start_exchange("一区", "甲", "乙", "祝福戒指").await;

        // Receiver first, then owner.
        engine
            .handle_confirm("一区", &confirm("乙", OP_RECEIVE, "祝福戒指"))
            .await;
        assert_eq!(engine.pending(), 1);
        engine
            .handle_confirm("一区", &confirm("甲", OP_TRANSFER, "祝福戒指"))
            .await;
        assert_eq!(engine.pending(), 0);
    }

    #[tokio::test]
    async fn failed_or_mismatched_confirms_are_ignored() {
        let (engine, _outbound, _registry) = setup();
        engine.start_exchange("一区", "甲", "乙", "祝福戒指").await;

        let mut bad = confirm("甲", OP_TRANSFER, "祝福戒指");
        bad.status = "失败".to_string();
        engine.handle_confirm("一区", &bad).await;

        // Wrong op for the role's side.
        engine
            .handle_confirm("一区", &confirm("甲", OP_RECEIVE, "祝福戒指"))
            .await;
        // Wrong zone.
        engine
            .handle_confirm("二区", &confirm("甲", OP_TRANSFER, "祝福戒指"))
            .await;
        assert_eq!(engine.pending(), 1);
    }

    #[tokio::test]
    async fn start_exchange_is_idempotent() {
        let (engine, _outbound, _registry) = setup();
        engine.start_exchange("一区", "甲", "乙", "祝福戒指").await;
        engine.start_exchange("一区", "甲", "乙", "祝福戒指").await;
        assert_eq!(engine.pending(), 1);
    }

    #[tokio::test]
    async fn coordinates_forward_to_owner() {
        let (engine, outbound, registry) = setup();
        let mut orx = outbound.register("C-O");
        registry
            .upsert(RoleAttributes {
                zone: "一区".into(),
                role_name: "持有者".into(),
                client_id: "C-O".into(),
                ..Default::default()
            })
            .unwrap();

        engine.handle_coordinate(
            "一区",
            &CoordPayload {
                role_name: "接收者".into(),
                from_role: "持有者".into(),
                map: "盟重".into(),
                x: 330,
                y: 270,
                client_id: String::new(),
            },
        );
        let msgs = drain(&mut orx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["地图"], "盟重");
        assert_eq!(msgs[0]["X"], 330);
        assert_eq!(msgs[0]["角色名"], "接收者");
    }
}

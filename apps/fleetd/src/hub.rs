//! Connection hub: websocket accept loop, per-connection reader / writer /
//! heartbeat tasks, inbound dispatch, and the per-minute broadcast loop
//! that pushes current plans and replans every three hours.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{info, warn};

use fleetproto::push::{ConnectionAck, Heartbeat, MapAssignment, MapAssignmentData};
use fleetproto::report::RoleAttributes;
use fleetproto::{Inbound, MSG_CONNECTION_ACK, MSG_HEARTBEAT};

use crate::alloc::{self, Assignment, MapTarget};
use crate::db::Db;
use crate::eventlog::{EventLog, Stream};
use crate::exchange::ExchangeEngine;
use crate::outbound::Outbound;
use crate::registry::Registry;
use crate::tasks::TaskQueue;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(3 * 60);
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(60);
pub const PLAN_RECALC_INTERVAL: Duration = Duration::from_secs(3 * 60 * 60);

struct PlanState {
    assignments: Vec<Assignment>,
    last_plan: Instant,
    last_send: Option<Instant>,
}

/// Per-zone plan state plus the global last-pushed-target map used to
/// keep the map_allocation log quiet when nothing changed.
pub struct PlanStore {
    states: RwLock<HashMap<String, PlanState>>,
    last_assign: Mutex<HashMap<(String, String), MapTarget>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            last_assign: Mutex::new(HashMap::new()),
        }
    }

    fn update(&self, zone: &str, assignments: Vec<Assignment>, at: Instant) {
        let mut states = self.states.write().expect("plan lock");
        states.insert(
            zone.to_string(),
            PlanState {
                assignments,
                last_plan: at,
                last_send: None,
            },
        );
    }

    fn mark_sent(&self, zone: &str, at: Instant) {
        let mut states = self.states.write().expect("plan lock");
        if let Some(st) = states.get_mut(zone) {
            st.last_send = Some(at);
        }
    }

    fn get(&self, zone: &str) -> Option<(Vec<Assignment>, Instant, Option<Instant>)> {
        let states = self.states.read().expect("plan lock");
        states
            .get(zone)
            .map(|st| (st.assignments.clone(), st.last_plan, st.last_send))
    }

    fn clear(&self, zone: &str) {
        self.states.write().expect("plan lock").remove(zone);
    }

    /// Record the target pushed for (zone, role). Returns the previous
    /// target wrapped once when it changed, `None` when unchanged (the
    /// caller then skips the audit line).
    fn note_assignment(
        &self,
        zone: &str,
        role: &str,
        target: MapTarget,
    ) -> Option<Option<MapTarget>> {
        let mut last = self.last_assign.lock().expect("last assign lock");
        let key = (zone.to_string(), role.to_string());
        let prev = last.get(&key).copied();
        if prev == Some(target) {
            return None;
        }
        last.insert(key, target);
        Some(prev)
    }
}

pub struct Hub {
    pub outbound: Outbound,
    pub registry: Arc<Registry>,
    pub tasks: Arc<TaskQueue>,
    pub exchange: Arc<ExchangeEngine>,
    pub plans: PlanStore,
    pub db: Db,
    pub log: Arc<EventLog>,
}

fn new_client_id() -> String {
    const CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    let mut part = |n: usize| -> String {
        (0..n)
            .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
            .collect()
    };
    let head = part(8);
    let tail = part(4);
    format!("{head}-{tail}")
}

fn format_target(t: &MapTarget) -> String {
    if t.floor > 0 {
        format!("{}-{}", t.map, t.floor)
    } else {
        t.map.to_string()
    }
}

impl Hub {
    pub fn new(
        outbound: Outbound,
        registry: Arc<Registry>,
        tasks: Arc<TaskQueue>,
        exchange: Arc<ExchangeEngine>,
        db: Db,
        log: Arc<EventLog>,
    ) -> Arc<Self> {
        Arc::new(Self {
            outbound,
            registry,
            tasks,
            exchange,
            plans: PlanStore::new(),
            db,
            log,
        })
    }

    /// Accept loop; runs until the listener is dropped.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(x) => x,
                Err(e) => {
                    warn!(err = %e, "accept failed");
                    continue;
                }
            };
            let hub = self.clone();
            tokio::spawn(async move {
                if let Err(e) = hub.handle_conn(stream).await {
                    info!(peer = %peer, err = %e, "connection ended with error");
                }
            });
        }
    }

    async fn handle_conn(self: Arc<Self>, stream: TcpStream) -> anyhow::Result<()> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut sink, mut stream) = ws.split();

        let client_id = new_client_id();
        let mut rx = self.outbound.register(&client_id);
        self.log.log(
            Stream::Connection,
            &format!("connected client_id={} total={}", client_id, self.outbound.count()),
        );
        self.outbound.send_json(
            &client_id,
            &ConnectionAck {
                code: 200,
                message: "成功",
                msg_type: MSG_CONNECTION_ACK,
                client_id: client_id.clone(),
            },
        );

        let shutdown = Arc::new(Notify::new());
        let last_hb = Arc::new(Mutex::new(Instant::now()));

        // Writer: drains the bounded queue; a failed write ends the
        // connection.
        let writer = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if sink.send(Message::Text(msg)).await.is_err() {
                        shutdown.notify_one();
                        break;
                    }
                }
            })
        };

        // Heartbeat: ping every 30 s, close after 3 min of silence.
        let hb = {
            let hub = self.clone();
            let client_id = client_id.clone();
            let shutdown = shutdown.clone();
            let last_hb = last_hb.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    hub.outbound.send_json(
                        &client_id,
                        &Heartbeat {
                            msg_type: MSG_HEARTBEAT,
                            client_id: client_id.clone(),
                        },
                    );
                    let stale = last_hb.lock().expect("hb lock").elapsed() > HEARTBEAT_TIMEOUT;
                    if stale {
                        hub.log.log(
                            Stream::Connection,
                            &format!("client_id={client_id} heartbeat timeout; closing"),
                        );
                        shutdown.notify_one();
                        break;
                    }
                }
            })
        };

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        _ => break,
                    };
                    if let Message::Text(text) = msg {
                        self.handle_message(&client_id, &last_hb, &text).await;
                    }
                }
                _ = shutdown.notified() => break,
            }
        }

        writer.abort();
        hb.abort();
        self.outbound.remove(&client_id);
        self.registry.remove_client(&client_id);
        self.log.log(
            Stream::Connection,
            &format!("disconnected client_id={} total={}", client_id, self.outbound.count()),
        );
        Ok(())
    }

    async fn handle_message(&self, client_id: &str, last_hb: &Mutex<Instant>, text: &str) {
        match fleetproto::classify(text) {
            None => {} // malformed frames are dropped
            Some(Inbound::HeartbeatResponse) => {
                *last_hb.lock().expect("hb lock") = Instant::now();
            }
            Some(Inbound::Ack) => {
                self.log.log(
                    Stream::Connection,
                    &format!("ack received from client_id={client_id}"),
                );
                self.ack_received(client_id);
            }
            Some(Inbound::DailyTask(m)) => self.tasks.handle(&m),
            Some(Inbound::Confirm(c)) => {
                for zone in self.registry.list_zones() {
                    self.exchange.handle_confirm(&zone, &c).await;
                }
            }
            Some(Inbound::Coordinate(c)) => {
                for zone in self.registry.list_zones() {
                    self.exchange.handle_coordinate(&zone, &c);
                }
            }
            Some(Inbound::Role(r)) => self.handle_role_report(*r).await,
        }
    }

    /// The agent confirmed a directive; note it against every role the
    /// connection owns. Delivery stays periodic regardless.
    fn ack_received(&self, client_id: &str) {
        for zone in self.registry.list_zones() {
            let snap = self.registry.snapshot(&zone);
            for (role, cid) in &snap.client_by_role {
                if cid == client_id {
                    self.log.log(
                        Stream::MapAlloc,
                        &format!("ack confirmed zone={zone} role={role} client_id={client_id}"),
                    );
                }
            }
        }
    }

    async fn handle_role_report(&self, report: RoleAttributes) {
        let Some((role, _was_new)) = self.registry.upsert(report) else {
            return;
        };
        self.db.upsert_role(&role).await;

        // Plan immediately once the population threshold is met, or when
        // the zone's wait window already lapsed.
        let snap = self.registry.snapshot(&role.zone);
        let need = alloc::needed_by_merge(&role.merge_state);
        if snap.roles.len() >= need || Instant::now() > snap.wait_alloc_until {
            let now = Instant::now();
            let assignments = alloc::plan(&snap);
            self.plans.update(&role.zone, assignments.clone(), now);
            if !assignments.is_empty() {
                self.dispatch_assignments(&role.zone, &snap, &assignments);
                self.plans.mark_sent(&role.zone, Instant::now());
            }
            self.exchange.plan_and_dispatch(&role.zone).await;
        }
    }

    fn dispatch_assignments(
        &self,
        zone: &str,
        snap: &crate::registry::ZoneSnapshot,
        assignments: &[Assignment],
    ) {
        for a in assignments {
            let Some(cid) = snap.client_by_role.get(&a.role_name) else {
                continue;
            };
            if cid.is_empty() {
                continue;
            }
            let mage = snap
                .roles
                .get(&a.role_name)
                .map(|r| alloc::is_mage(&r.class))
                .unwrap_or(false);
            let msg = MapAssignment {
                role_name: a.role_name.clone(),
                data: MapAssignmentData {
                    map: a.target.map.to_string(),
                    floor: if mage && a.target.floor > 0 {
                        Some(a.target.floor)
                    } else {
                        None
                    },
                },
                client_id: cid.clone(),
            };
            if let Some(prev) = self.plans.note_assignment(zone, &a.role_name, a.target) {
                let prev = prev
                    .as_ref()
                    .map(format_target)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "(无)".to_string());
                self.log.log(
                    Stream::MapAlloc,
                    &format!("role={} prev={} -> plan={}", a.role_name, prev, format_target(&a.target)),
                );
            }
            self.outbound.send_json(cid, &msg);
        }
    }

    /// One pass of the broadcast scheduler over every known zone.
    fn broadcast_tick(&self, now: Instant) {
        for zone in self.registry.list_zones() {
            let snap = self.registry.snapshot(&zone);
            if snap.is_empty() {
                self.plans.clear(&zone);
                continue;
            }
            let need = alloc::needed_by_merge(snap.merge_state());
            let threshold_met = snap.roles.len() >= need;
            let wait_expired = now > snap.wait_alloc_until;

            let state = self.plans.get(&zone);
            let should_plan = match &state {
                None => threshold_met || wait_expired,
                Some((_, last_plan, _)) => now.duration_since(*last_plan) >= PLAN_RECALC_INTERVAL,
            };

            let (mut assignments, mut last_send) = match state {
                Some((a, _, ls)) => (a, ls),
                None => (Vec::new(), None),
            };
            if should_plan {
                assignments = alloc::plan(&snap);
                self.plans.update(&zone, assignments.clone(), now);
                last_send = None;
            }
            if assignments.is_empty() {
                continue;
            }

            let resend_due = last_send
                .map(|t| now.duration_since(t) >= BROADCAST_INTERVAL)
                .unwrap_or(true);
            if should_plan || resend_due {
                self.dispatch_assignments(&zone, &snap, &assignments);
                self.plans.mark_sent(&zone, Instant::now());
            }
        }
    }

    pub fn spawn_broadcast(self: &Arc<Self>) {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(BROADCAST_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                hub.broadcast_tick(Instant::now());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ZoneSnapshot;

    fn test_hub() -> Arc<Hub> {
        let dir = std::env::temp_dir().join(format!("fleetd-hub-{}", std::process::id()));
        let log = Arc::new(EventLog::new(dir).unwrap());
        let registry = Arc::new(Registry::new(log.clone()));
        let outbound = Outbound::new();
        let tasks = Arc::new(TaskQueue::new(outbound.clone(), registry.clone(), log.clone()));
        let exchange = Arc::new(ExchangeEngine::new(
            Db::disabled(),
            outbound.clone(),
            registry.clone(),
            log.clone(),
        ));
        Hub::new(outbound, registry, tasks, exchange, Db::disabled(), log)
    }

    #[test]
    fn client_ids_look_right() {
        for _ in 0..50 {
            let id = new_client_id();
            let (head, tail) = id.split_once('-').unwrap();
            assert_eq!(head.len(), 8);
            assert_eq!(tail.len(), 4);
            assert!(id
                .chars()
                .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn repeat_pushes_stay_out_of_the_audit_log() {
        let hub = test_hub();
        let t1 = MapTarget { map: "五蛇殿", floor: 1 };
        let t2 = MapTarget { map: "通天塔", floor: 1 };

        // First sight logs with no previous target.
        assert_eq!(hub.plans.note_assignment("一区", "甲", t1), Some(None));
        // Same target again: silent.
        assert_eq!(hub.plans.note_assignment("一区", "甲", t1), None);
        // Change logs the previous target.
        assert_eq!(hub.plans.note_assignment("一区", "甲", t2), Some(Some(t1)));
        // Per-role keys are independent.
        assert_eq!(hub.plans.note_assignment("一区", "乙", t1), Some(None));
    }

    #[tokio::test]
    async fn unchanged_snapshot_resends_without_replanning() {
        let hub = test_hub();
        let mut rx = hub.outbound.register("C1");
        for i in 0..12 {
            hub.registry
                .upsert(RoleAttributes {
                    zone: "一区".into(),
                    role_name: format!("战士{i:02}"),
                    client_id: "C1".into(),
                    class: "战士".into(),
                    merge_state: "未合区".into(),
                    ..Default::default()
                })
                .unwrap();
        }

        let t0 = Instant::now();
        hub.broadcast_tick(t0);
        let first: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(first.len(), 12);
        let (_, plan_at, _) = hub.plans.get("一区").unwrap();

        // Another tick a minute later: same plan object, directives
        // re-sent, nothing replanned.
        hub.broadcast_tick(t0 + Duration::from_secs(61));
        let second: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(second.len(), 12);
        let (_, plan_at2, _) = hub.plans.get("一区").unwrap();
        assert_eq!(plan_at, plan_at2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_zone_drops_plan_state() {
        let hub = test_hub();
        hub.registry
            .upsert(RoleAttributes {
                zone: "一区".into(),
                role_name: "甲".into(),
                client_id: "C1".into(),
                class: "战士".into(),
                merge_state: "未合区".into(),
                ..Default::default()
            })
            .unwrap();
        let snap: ZoneSnapshot = hub.registry.snapshot("一区");
        hub.plans.update("一区", alloc::plan(&snap), Instant::now());
        assert!(hub.plans.get("一区").is_some());

        hub.registry.remove_client("C1");
        hub.broadcast_tick(Instant::now());
        assert!(hub.plans.get("一区").is_none());
    }

    #[tokio::test]
    async fn threshold_report_triggers_immediate_plan() {
        let hub = test_hub();
        let mut rx = hub.outbound.register("C1");
        for i in 0..12 {
            let report = serde_json::json!({
                "充值区服": "一区",
                "角色名": format!("战士{i:02}"),
                "职业": "战士",
                "合区": "未合区",
                "client_id": "C1",
            });
            hub.handle_message("C1", &Mutex::new(Instant::now()), &report.to_string())
                .await;
        }
        let msgs: Vec<serde_json::Value> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|s| serde_json::from_str(&s).unwrap())
            .collect();
        // Exactly one plan push: the 12th report crossed the threshold.
        let assignments: Vec<&serde_json::Value> =
            msgs.iter().filter(|m| m.get("data").is_some()).collect();
        assert_eq!(assignments.len(), 12);
        assert!(assignments.iter().all(|m| m["data"]["层数"].is_null()));
    }

    #[tokio::test]
    async fn websocket_session_end_to_end() {
        let dir = std::env::temp_dir().join(format!("fleetd-hub-ws-{}", std::process::id()));
        let log = Arc::new(EventLog::new(dir).unwrap());
        let registry = Arc::new(Registry::new(log.clone()));
        let outbound = Outbound::new();
        let tasks = Arc::new(TaskQueue::new(outbound.clone(), registry.clone(), log.clone()));
        let exchange = Arc::new(ExchangeEngine::new(
            Db::disabled(),
            outbound.clone(),
            registry.clone(),
            log.clone(),
        ));
        let hub = Hub::new(outbound, registry.clone(), tasks, exchange, Db::disabled(), log);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(hub.clone().run(listener));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();

        let ack = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let ack: serde_json::Value = serde_json::from_str(ack.to_text().unwrap()).unwrap();
        assert_eq!(ack["type"], "connection_ack");
        assert_eq!(ack["code"], 200);
        let client_id = ack["client_id"].as_str().unwrap().to_string();

        // Report a role and confirm it landed in the registry.
        let report = serde_json::json!({
            "充值区服": "测试区",
            "角色名": "远征者",
            "职业": "法师",
            "合区": "未合区",
            "client_id": client_id,
        });
        ws.send(Message::Text(report.to_string())).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if registry.client_of("测试区", "远征者").as_deref() == Some(client_id.as_str()) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        // Closing the socket purges the role.
        ws.close(None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if registry.snapshot("测试区").is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}

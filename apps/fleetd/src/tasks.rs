use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use fleetproto::push::TaskStatus;
use fleetproto::report::DailyTaskMessage;
use fleetproto::{MSG_DAILY_TASK, TASK_ALLOW, TASK_FINISH, TASK_START, TASK_WAIT};

use crate::eventlog::{EventLog, Stream};
use crate::outbound::Outbound;
use crate::registry::Registry;

/// Concurrency gate per zone; everybody else waits in FIFO order.
pub const MAX_RUNNING_PER_ZONE: usize = 3;

struct State {
    // zone -> roles currently admitted
    running: HashMap<String, HashSet<String>>,
    // zone -> FIFO waitlist
    waiting: HashMap<String, Vec<String>>,
    // zone -> role -> last status pushed, for audit dedup
    status: HashMap<String, HashMap<String, String>>,
}

pub struct TaskQueue {
    state: Mutex<State>,
    outbound: Outbound,
    registry: Arc<Registry>,
    log: Arc<EventLog>,
}

impl TaskQueue {
    pub fn new(outbound: Outbound, registry: Arc<Registry>, log: Arc<EventLog>) -> Self {
        Self {
            state: Mutex::new(State {
                running: HashMap::new(),
                waiting: HashMap::new(),
                status: HashMap::new(),
            }),
            outbound,
            registry,
            log,
        }
    }

    pub fn handle(&self, msg: &DailyTaskMessage) {
        let zone = msg.zone.as_str();
        let role = msg.role_name.as_str();
        if zone.is_empty() || role.is_empty() {
            return;
        }

        let mut st = self.state.lock().expect("task queue lock");
        match msg.task_status.as_str() {
            TASK_START => {
                let running = st.running.entry(zone.to_string()).or_default();
                if running.contains(role) {
                    // Idempotent: already admitted, just re-allow.
                    self.send_status(&mut st, &msg.client_id, role, zone, TASK_ALLOW);
                    return;
                }
                if st.waiting.get(zone).is_some_and(|q| q.iter().any(|r| r == role)) {
                    self.send_status(&mut st, &msg.client_id, role, zone, TASK_WAIT);
                    return;
                }
                let running = st.running.entry(zone.to_string()).or_default();
                if running.len() < MAX_RUNNING_PER_ZONE {
                    running.insert(role.to_string());
                    self.send_status(&mut st, &msg.client_id, role, zone, TASK_ALLOW);
                } else {
                    st.waiting.entry(zone.to_string()).or_default().push(role.to_string());
                    self.send_status(&mut st, &msg.client_id, role, zone, TASK_WAIT);
                }
            }
            TASK_FINISH => {
                if let Some(running) = st.running.get_mut(zone) {
                    running.remove(role);
                }
                self.send_status(&mut st, &msg.client_id, role, zone, TASK_FINISH);

                let room = st
                    .running
                    .get(zone)
                    .map(|r| r.len() < MAX_RUNNING_PER_ZONE)
                    .unwrap_or(true);
                let next = match (room, st.waiting.get_mut(zone)) {
                    (true, Some(q)) if !q.is_empty() => Some(q.remove(0)),
                    _ => None,
                };
                if let Some(next) = next {
                    st.running.entry(zone.to_string()).or_default().insert(next.clone());
                    // The opener's connection may be gone; resolve the
                    // current owner at promotion time.
                    let cid = self.registry.client_of(zone, &next).unwrap_or_default();
                    self.send_status(&mut st, &cid, &next, zone, TASK_ALLOW);
                }
            }
            _ => {}
        }
    }

    fn send_status(&self, st: &mut State, client_id: &str, role: &str, zone: &str, status: &str) {
        let resp = TaskStatus {
            role_name: role.to_string(),
            zone: zone.to_string(),
            msg_type: MSG_DAILY_TASK,
            task_status: status.to_string(),
            client_id: client_id.to_string(),
        };
        self.outbound.send_json(client_id, &resp);

        // Unchanged status re-sends the message but skips the audit line.
        let zone_status = st.status.entry(zone.to_string()).or_default();
        if zone_status.get(role).map(String::as_str) == Some(status) {
            return;
        }
        zone_status.insert(role.to_string(), status.to_string());
        self.log
            .log(Stream::TaskQueue, &format!("zone={zone} role={role} status={status}"));
    }

    #[cfg(test)]
    fn running_count(&self, zone: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .running
            .get(zone)
            .map(|r| r.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn waiting_list(&self, zone: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .waiting
            .get(zone)
            .cloned()
            .unwrap_or_default()
    }
}

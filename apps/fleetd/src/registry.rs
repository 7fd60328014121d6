use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use fleetproto::report::{EquipItem, RoleAttributes};

use crate::eventlog::{EventLog, Stream};

/// How long a zone waits for more roles before planning with whoever is
/// there. Slides forward on every upsert.
pub const WAIT_ALLOC_WINDOW: Duration = Duration::from_secs(3 * 60);

/// Deep-copied view of one zone, handed to the planners. Never aliases
/// registry state.
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    pub roles: HashMap<String, RoleAttributes>,
    pub client_by_role: HashMap<String, String>,
    pub last_update: Instant,
    pub wait_alloc_until: Instant,
}

impl ZoneSnapshot {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Merge state as reported by any role in the zone.
    pub fn merge_state(&self) -> &str {
        self.roles
            .values()
            .map(|r| r.merge_state.as_str())
            .find(|m| !m.is_empty())
            .unwrap_or("未合区")
    }
}

struct Zone {
    roles: HashMap<String, RoleAttributes>,
    client_by_role: HashMap<String, String>,
    last_update: Instant,
    wait_alloc_until: Instant,
}

/// Live per-zone role state. A role exists here exactly while its owning
/// client is connected.
pub struct Registry {
    zones: RwLock<HashMap<String, Zone>>,
    log: Arc<EventLog>,
}

impl Registry {
    pub fn new(log: Arc<EventLog>) -> Self {
        Self {
            zones: RwLock::new(HashMap::new()),
            log,
        }
    }

    /// Store or refresh a role report. Returns the stored role and whether
    /// it was first sight; `None` when zone or role name is empty (the
    /// report is dropped without logging).
    ///
    /// Every call refreshes the owning-client index and slides the zone's
    /// wait deadline; a role_info audit line is written only on first
    /// sight or when the current map or equipped set changed.
    pub fn upsert(&self, r: RoleAttributes) -> Option<(RoleAttributes, bool)> {
        if r.zone.is_empty() || r.role_name.is_empty() {
            return None;
        }

        let now = Instant::now();
        let (stored, was_new, should_log) = {
            let mut zones = self.zones.write().expect("registry lock");
            let zone = zones.entry(r.zone.clone()).or_insert_with(|| Zone {
                roles: HashMap::new(),
                client_by_role: HashMap::new(),
                last_update: now,
                wait_alloc_until: now + WAIT_ALLOC_WINDOW,
            });

            let prev = zone.roles.get(&r.role_name);
            let was_new = prev.is_none();
            let should_log = match prev {
                None => true,
                Some(p) => p.map_name != r.map_name || !equip_equal(&p.equipments, &r.equipments),
            };

            zone.client_by_role.insert(r.role_name.clone(), r.client_id.clone());
            zone.roles.insert(r.role_name.clone(), r.clone());
            zone.last_update = now;
            zone.wait_alloc_until = now + WAIT_ALLOC_WINDOW;
            (r, was_new, should_log)
        };

        if should_log {
            self.log.log(
                Stream::RoleInfo,
                &format!(
                    "role={} zone={} merge={} class={} school={} magic={} lucky={} level={} skill={} map={}",
                    stored.role_name,
                    stored.zone,
                    stored.merge_state,
                    stored.class,
                    stored.school,
                    stored.magic,
                    stored.lucky,
                    stored.level,
                    stored.skill,
                    stored.map_name
                ),
            );
        }
        Some((stored, was_new))
    }

    /// Disconnect path: drop every role owned by this client, in every zone.
    pub fn remove_client(&self, client_id: &str) {
        let mut zones = self.zones.write().expect("registry lock");
        for zone in zones.values_mut() {
            let gone: Vec<String> = zone
                .client_by_role
                .iter()
                .filter(|(_, cid)| cid.as_str() == client_id)
                .map(|(role, _)| role.clone())
                .collect();
            for role in gone {
                zone.roles.remove(&role);
                zone.client_by_role.remove(&role);
            }
        }
    }

    pub fn snapshot(&self, zone: &str) -> ZoneSnapshot {
        let zones = self.zones.read().expect("registry lock");
        match zones.get(zone) {
            Some(z) => ZoneSnapshot {
                roles: z.roles.clone(),
                client_by_role: z.client_by_role.clone(),
                last_update: z.last_update,
                wait_alloc_until: z.wait_alloc_until,
            },
            None => {
                let now = Instant::now();
                ZoneSnapshot {
                    roles: HashMap::new(),
                    client_by_role: HashMap::new(),
                    last_update: now,
                    wait_alloc_until: now,
                }
            }
        }
    }

    pub fn list_zones(&self) -> Vec<String> {
        let zones = self.zones.read().expect("registry lock");
        zones.keys().cloned().collect()
    }

    pub fn client_of(&self, zone: &str, role: &str) -> Option<String> {
        let zones = self.zones.read().expect("registry lock");
        zones.get(zone)?.client_by_role.get(role).cloned()
    }
}

/// Equipped sets compare as multisets of (slot, name); order is noise.
fn equip_equal(a: &[EquipItem], b: &[EquipItem]) -> bool {
    fn multiset(items: &[EquipItem]) -> HashMap<(&str, &str), u32> {
        let mut m = HashMap::new();
        for e in items {
            *m.entry((e.slot.as_str(), e.name.as_str())).or_insert(0) += 1;
        }
        m
    }
    multiset(a) == multiset(b)
}

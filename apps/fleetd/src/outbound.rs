use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

/// Per-connection outbound queue depth. A full queue drops the directive;
/// the next planner tick re-sends.
pub const SEND_QUEUE_CAP: usize = 64;

/// The one sender capability shared by every service: `(client_id,
/// payload) -> ()`, best-effort and non-blocking. Cloning shares the
/// client map with the hub.
#[derive(Clone, Default)]
pub struct Outbound {
    clients: Arc<Mutex<HashMap<String, mpsc::Sender<String>>>>,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and hand back the queue its writer drains.
    pub fn register(&self, client_id: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAP);
        self.clients
            .lock()
            .expect("outbound lock")
            .insert(client_id.to_string(), tx);
        rx
    }

    pub fn remove(&self, client_id: &str) {
        self.clients.lock().expect("outbound lock").remove(client_id);
    }

    pub fn count(&self) -> usize {
        self.clients.lock().expect("outbound lock").len()
    }

    /// Serialize and enqueue. Unknown client or full queue drops the
    /// message on the floor.
    pub fn send_json<T: Serialize>(&self, client_id: &str, payload: &T) {
        if client_id.is_empty() {
            return;
        }
        let tx = {
            let clients = self.clients.lock().expect("outbound lock");
            match clients.get(client_id) {
                Some(tx) => tx.clone(),
                None => return,
            }
        };
        if let Ok(s) = serde_json::to_string(payload) {
            let _ = tx.try_send(s);
        }
    }
}

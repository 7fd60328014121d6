use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{FixedOffset, Utc};
use tracing::warn;

/// The five audit streams, each its own daily file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Connection,
    RoleInfo,
    MapAlloc,
    Equipment,
    TaskQueue,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Stream::Connection => "connection",
            Stream::RoleInfo => "role_info",
            Stream::MapAlloc => "map_allocation",
            Stream::Equipment => "equipment_allocation",
            Stream::TaskQueue => "task_queue",
        }
    }
}

/// Daily-rotated audit logs: `log_YYYYMMDD_<stream>.log` under the log
/// directory. Rotation happens on write when the UTC+8 date changes.
pub struct EventLog {
    dir: PathBuf,
    inner: Mutex<Writers>,
}

struct Writers {
    day: String,
    open: HashMap<&'static str, BufWriter<std::fs::File>>,
}

// Log dates follow the game servers' operating timezone.
fn today() -> String {
    let tz = FixedOffset::east_opt(8 * 3600).expect("utc+8 offset");
    Utc::now().with_timezone(&tz).format("%Y%m%d").to_string()
}

fn timestamp() -> String {
    let tz = FixedOffset::east_opt(8 * 3600).expect("utc+8 offset");
    Utc::now().with_timezone(&tz).format("%Y/%m/%d %H:%M:%S%.6f").to_string()
}

impl EventLog {
    pub fn new(dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            inner: Mutex::new(Writers {
                day: String::new(),
                open: HashMap::new(),
            }),
        })
    }

    pub fn log(&self, stream: Stream, line: &str) {
        let day = today();
        let mut w = match self.inner.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };

        if w.day != day {
            for (_, f) in w.open.iter_mut() {
                let _ = f.flush();
            }
            w.open.clear();
            w.day = day.clone();
        }

        let name = stream.name();
        if !w.open.contains_key(name) {
            let path = self.dir.join(format!("log_{day}_{name}.log"));
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(f) => {
                    w.open.insert(name, BufWriter::new(f));
                }
                Err(e) => {
                    warn!(err = %e, path = %path.display(), "open eventlog failed");
                    return;
                }
            }
        }

        if let Some(f) = w.open.get_mut(name) {
            let _ = writeln!(f, "{} {}", timestamp(), line);
        }
    }

    pub fn flush_all(&self) {
        let mut w = match self.inner.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, f) in w.open.iter_mut() {
            let _ = f.flush();
        }
    }
}

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub log_dir: PathBuf,
    // Persistence is disabled when no DSN is configured.
    pub db_dsn: Option<String>,
    pub env: String,
}

impl Config {
    pub fn load() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(8888);

        Self {
            port,
            log_dir: PathBuf::from(getenv("LOG_DIR", "logs")),
            db_dsn: std::env::var("MYSQL_DSN").ok().filter(|s| !s.is_empty()),
            env: getenv("APP_ENV", "dev"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn getenv(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

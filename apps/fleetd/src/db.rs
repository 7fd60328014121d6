use fleetproto::report::RoleAttributes;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::warn;

/// Persistence gateway. The in-memory registries stay authoritative for
/// planning; failures here are logged and swallowed. Constructed disabled
/// when no DSN is configured (tests, local runs without MySQL).
#[derive(Clone)]
pub struct Db {
    pool: Option<MySqlPool>,
}

impl Db {
    pub async fn connect(dsn: &str) -> anyhow::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(32)
            .connect(dsn)
            .await?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn disabled() -> Self {
        Self { pool: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Upsert one role row, keyed (role_name, zone).
    pub async fn upsert_role(&self, r: &RoleAttributes) {
        let Some(pool) = &self.pool else { return };
        let res = sqlx::query(
            r#"INSERT INTO roles
               (role_name, zone, merge_state, class, school, skill, level, lucky, magic, current_map, client_id, created_at, x, y)
               VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)
               ON DUPLICATE KEY UPDATE
               merge_state=VALUES(merge_state), class=VALUES(class), school=VALUES(school),
               skill=VALUES(skill), level=VALUES(level), lucky=VALUES(lucky), magic=VALUES(magic),
               current_map=VALUES(current_map), client_id=VALUES(client_id), x=VALUES(x), y=VALUES(y)"#,
        )
        .bind(&r.role_name)
        .bind(&r.zone)
        .bind(&r.merge_state)
        .bind(&r.class)
        .bind(&r.school)
        .bind(r.skill)
        .bind(r.level)
        .bind(r.lucky)
        .bind(r.magic)
        .bind(&r.map_name)
        .bind(&r.client_id)
        .bind(&r.created_at)
        .bind(r.x)
        .bind(r.y)
        .execute(pool)
        .await;
        if let Err(e) = res {
            warn!(err = %e, role = %r.role_name, zone = %r.zone, "role upsert failed");
        }
    }

    /// Insert a fresh exchange row in state `waiting`.
    pub async fn insert_exchange(&self, zone: &str, owner: &str, receiver: &str, item: &str) {
        let Some(pool) = &self.pool else { return };
        let res = async {
            let mut tx = pool.begin().await?;
            sqlx::query(
                "INSERT INTO exchanges (zone, owner_role, receiver_role, item_name, status) VALUES (?,?,?,?,'waiting')",
            )
            .bind(zone)
            .bind(owner)
            .bind(receiver)
            .bind(item)
            .execute(&mut *tx)
            .await?;
            tx.commit().await
        }
        .await;
        if let Err(e) = res {
            warn!(err = %e, zone, owner, receiver, item, "exchange insert failed");
        }
    }

    /// Advance an exchange row to `status`.
    pub async fn set_exchange_status(
        &self,
        zone: &str,
        owner: &str,
        receiver: &str,
        item: &str,
        status: &str,
    ) {
        let Some(pool) = &self.pool else { return };
        let res = async {
            let mut tx = pool.begin().await?;
            sqlx::query(
                "UPDATE exchanges SET status=? WHERE zone=? AND owner_role=? AND receiver_role=? AND item_name=?",
            )
            .bind(status)
            .bind(zone)
            .bind(owner)
            .bind(receiver)
            .bind(item)
            .execute(&mut *tx)
            .await?;
            tx.commit().await
        }
        .await;
        if let Err(e) = res {
            warn!(err = %e, zone, owner, receiver, item, status, "exchange status update failed");
        }
    }
}

//! Append-only conversation log.
//!
//! Turns are written once and never updated or deleted. Reads are scoped to
//! one (tenant, user) pair and ordered by the log sequence, which reflects
//! the exact order of `append` calls.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use parley_core::error::ParleyError;
use parley_core::types::{Turn, TurnRole};

use crate::db::{storage_err, Database};
use crate::repository::tenant_id;

/// Durable per-tenant, per-user conversation log.
#[derive(Clone)]
pub struct TurnRepository {
    db: Arc<Database>,
}

impl TurnRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one turn. A single INSERT, so the turn is recorded fully or not at all.
    pub fn append(
        &self,
        tenant: &str,
        user: &str,
        role: TurnRole,
        text: &str,
    ) -> Result<Turn, ParleyError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        let seq = self.db.with_conn(|conn| {
            let tid = tenant_id(conn, tenant)?.ok_or_else(|| ParleyError::UnknownTenant(tenant.into()))?;
            conn.execute(
                "INSERT INTO conversation_turns (id, tenant_id, user_name, role, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    tid,
                    user,
                    role.as_str(),
                    text,
                    created_at.timestamp_millis(),
                ],
            )
            .map_err(storage_err("Failed to append turn"))?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(Turn {
            id,
            seq,
            tenant: tenant.to_string(),
            user: user.to_string(),
            role,
            text: text.to_string(),
            created_at,
        })
    }

    /// Full history of a user, oldest first.
    pub fn list(&self, tenant: &str, user: &str) -> Result<Vec<Turn>, ParleyError> {
        let mut turns = Vec::new();
        self.scan(tenant, user, "ASC", |turn| {
            turns.push(turn);
            true
        })?;
        Ok(turns)
    }

    /// Visit a user's turns from newest to oldest until `visit` returns false.
    pub fn scan_newest_first<F>(&self, tenant: &str, user: &str, visit: F) -> Result<(), ParleyError>
    where
        F: FnMut(Turn) -> bool,
    {
        self.scan(tenant, user, "DESC", visit)
    }

    /// Number of turns recorded for a user.
    #[cfg(test)]
    pub fn count(&self, tenant: &str, user: &str) -> Result<u64, ParleyError> {
        self.db.with_conn(|conn| {
            let tid = tenant_id(conn, tenant)?.ok_or_else(|| ParleyError::UnknownTenant(tenant.into()))?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM conversation_turns WHERE tenant_id = ?1 AND user_name = ?2",
                    rusqlite::params![tid, user],
                    |row| row.get(0),
                )
                .map_err(storage_err("Failed to count turns"))?;
            Ok(count as u64)
        })
    }

    fn scan<F>(&self, tenant: &str, user: &str, order: &str, mut visit: F) -> Result<(), ParleyError>
    where
        F: FnMut(Turn) -> bool,
    {
        self.db.with_conn(|conn| {
            let tid = tenant_id(conn, tenant)?.ok_or_else(|| ParleyError::UnknownTenant(tenant.into()))?;
            let sql = format!(
                "SELECT seq, id, role, text, created_at FROM conversation_turns
                 WHERE tenant_id = ?1 AND user_name = ?2
                 ORDER BY seq {}",
                order
            );
            let mut stmt = conn.prepare(&sql).map_err(storage_err("Failed to read turns"))?;
            let mut rows = stmt
                .query(rusqlite::params![tid, user])
                .map_err(storage_err("Failed to read turns"))?;

            while let Some(row) = rows.next().map_err(storage_err("Failed to read turn"))? {
                let turn = row_to_turn(row, tenant, user)?;
                if !visit(turn) {
                    break;
                }
            }
            Ok(())
        })
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>, tenant: &str, user: &str) -> Result<Turn, ParleyError> {
    let seq: i64 = row.get(0).map_err(|e| ParleyError::Storage(e.to_string()))?;
    let id_str: String = row.get(1).map_err(|e| ParleyError::Storage(e.to_string()))?;
    let role_str: String = row.get(2).map_err(|e| ParleyError::Storage(e.to_string()))?;
    let text: String = row.get(3).map_err(|e| ParleyError::Storage(e.to_string()))?;
    let created_ms: i64 = row.get(4).map_err(|e| ParleyError::Storage(e.to_string()))?;

    Ok(Turn {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| ParleyError::Storage(format!("Invalid UUID: {}", e)))?,
        seq,
        tenant: tenant.to_string(),
        user: user.to_string(),
        role: role_str.parse::<TurnRole>().map_err(ParleyError::Storage)?,
        text,
        created_at: Utc
            .timestamp_millis_opt(created_ms)
            .single()
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::TenantRepository;

    fn make_repo() -> TurnRepository {
        let db = Arc::new(Database::in_memory().unwrap());
        let tenants = TenantRepository::new(Arc::clone(&db));
        tenants.ensure_tenant("acme").unwrap();
        tenants.ensure_tenant("globex").unwrap();
        TurnRepository::new(db)
    }

    #[test]
    fn test_append_unknown_tenant() {
        let repo = make_repo();
        let result = repo.append("ghost", "u1", TurnRole::User, "hello");
        assert!(matches!(result, Err(ParleyError::UnknownTenant(_))));
    }

    #[test]
    fn test_append_returns_turn() {
        let repo = make_repo();
        let turn = repo
            .append("acme", "u1", TurnRole::User, "How many orders?")
            .unwrap();
        assert_eq!(turn.role, TurnRole::User);
        assert_eq!(turn.text, "How many orders?");
        assert_eq!(turn.tenant, "acme");
        assert_eq!(turn.user, "u1");
    }

    #[test]
    fn test_list_preserves_call_order() {
        let repo = make_repo();
        let roles = [
            TurnRole::User,
            TurnRole::AssistantQueryResult,
            TurnRole::AssistantExplanation,
            TurnRole::UserFeedback,
            TurnRole::AssistantReformulatedQuery,
        ];
        for (i, role) in roles.iter().enumerate() {
            repo.append("acme", "u1", *role, &format!("turn {}", i))
                .unwrap();
        }
        let turns = repo.list("acme", "u1").unwrap();
        assert_eq!(turns.len(), roles.len());
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.role, roles[i]);
            assert_eq!(turn.text, format!("turn {}", i));
        }
        assert!(turns.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn test_history_scoped_by_tenant_and_user() {
        let repo = make_repo();
        repo.append("acme", "u1", TurnRole::User, "a").unwrap();
        repo.append("acme", "u2", TurnRole::User, "b").unwrap();
        repo.append("globex", "u1", TurnRole::User, "c").unwrap();

        let turns = repo.list("acme", "u1").unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "a");
        assert_eq!(repo.count("globex", "u1").unwrap(), 1);
        assert_eq!(repo.count("acme", "nobody").unwrap(), 0);
    }

    #[test]
    fn test_scan_newest_first_stops_early() {
        let repo = make_repo();
        for i in 0..5 {
            repo.append("acme", "u1", TurnRole::User, &i.to_string())
                .unwrap();
        }
        let mut seen = Vec::new();
        repo.scan_newest_first("acme", "u1", |turn| {
            seen.push(turn.text);
            seen.len() < 2
        })
        .unwrap();
        assert_eq!(seen, vec!["4", "3"]);
    }

    #[test]
    fn test_turns_are_never_evicted() {
        let repo = make_repo();
        for i in 0..50 {
            repo.append("acme", "u1", TurnRole::User, &i.to_string())
                .unwrap();
        }
        assert_eq!(repo.count("acme", "u1").unwrap(), 50);
        assert_eq!(repo.list("acme", "u1").unwrap()[0].text, "0");
    }
}

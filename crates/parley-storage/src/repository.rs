//! Repository implementations for the tenant registry and schema store.
//!
//! Provides TenantRepository (tenants, logical databases, users) and
//! SchemaRepository (semantic schema descriptions) on top of the Database
//! struct using raw SQL.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use parley_core::error::ParleyError;
use parley_core::schema::SchemaDocument;
use parley_core::types::{LogicalDatabase, Tenant, User};

use crate::db::{storage_err, Database};

/// Look up a tenant's row id by name.
pub(crate) fn tenant_id(conn: &Connection, tenant: &str) -> Result<Option<i64>, ParleyError> {
    conn.query_row(
        "SELECT id FROM tenants WHERE name = ?1",
        rusqlite::params![tenant],
        |row| row.get(0),
    )
    .optional()
    .map_err(storage_err("Failed to look up tenant"))
}

fn require_name(kind: &str, value: &str) -> Result<(), ParleyError> {
    if value.trim().is_empty() {
        return Err(ParleyError::Validation(format!("{} name cannot be empty", kind)));
    }
    Ok(())
}

/// Generate a random 32-character hex credential token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

// =============================================================================
// TenantRepository
// =============================================================================

/// Registry of tenants, their logical databases, and their users.
#[derive(Clone)]
pub struct TenantRepository {
    db: Arc<Database>,
}

impl TenantRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a tenant if it does not exist yet, returning the stored row.
    pub fn ensure_tenant(&self, name: &str) -> Result<Tenant, ParleyError> {
        require_name("Tenant", name)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO tenants (name) VALUES (?1)",
                rusqlite::params![name],
            )
            .map_err(storage_err("Failed to create tenant"))?;
            let id = tenant_id(conn, name)?.ok_or_else(|| ParleyError::UnknownTenant(name.into()))?;
            Ok(Tenant {
                id,
                name: name.to_string(),
            })
        })
    }

    /// Find a tenant by name.
    pub fn find_tenant(&self, name: &str) -> Result<Option<Tenant>, ParleyError> {
        self.db.with_conn(|conn| {
            Ok(tenant_id(conn, name)?.map(|id| Tenant {
                id,
                name: name.to_string(),
            }))
        })
    }

    /// List all tenants ordered by name.
    pub fn list_tenants(&self) -> Result<Vec<Tenant>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name FROM tenants ORDER BY name")
                .map_err(storage_err("Failed to list tenants"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Tenant {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })
                .map_err(storage_err("Failed to list tenants"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(storage_err("Failed to read tenant"))
        })
    }

    /// Register a logical database for a tenant, creating the tenant if needed.
    ///
    /// Re-registering an existing `(tenant, name)` pair replaces its data
    /// source. The stored schema is replaced only when `schema` is given.
    pub fn register_database(
        &self,
        tenant: &str,
        name: &str,
        data_source: &Path,
        schema: Option<&SchemaDocument>,
    ) -> Result<LogicalDatabase, ParleyError> {
        require_name("Tenant", tenant)?;
        require_name("Database", name)?;
        let schema_json = schema.map(serde_json::to_string).transpose()?;
        let source = data_source.to_string_lossy().to_string();

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("Failed to begin transaction"))?;
            tx.execute(
                "INSERT OR IGNORE INTO tenants (name) VALUES (?1)",
                rusqlite::params![tenant],
            )
            .map_err(storage_err("Failed to create tenant"))?;
            let tid = tenant_id(&tx, tenant)?.ok_or_else(|| ParleyError::UnknownTenant(tenant.into()))?;
            tx.execute(
                "INSERT INTO logical_databases (tenant_id, name, data_source, schema_json)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (tenant_id, name) DO UPDATE SET
                     data_source = excluded.data_source,
                     schema_json = COALESCE(excluded.schema_json, logical_databases.schema_json),
                     updated_at = strftime('%s', 'now')",
                rusqlite::params![tid, name, source, schema_json],
            )
            .map_err(storage_err("Failed to register database"))?;
            tx.commit().map_err(storage_err("Failed to commit registration"))?;
            Ok(())
        })?;

        info!(tenant, database = name, data_source = %data_source.display(), "Logical database registered");
        self.find_database(tenant, name)
    }

    /// Resolve a tenant's logical database.
    pub fn find_database(&self, tenant: &str, name: &str) -> Result<LogicalDatabase, ParleyError> {
        self.db.with_conn(|conn| {
            let tid = tenant_id(conn, tenant)?.ok_or_else(|| ParleyError::UnknownTenant(tenant.into()))?;
            conn.query_row(
                "SELECT id, name, data_source FROM logical_databases
                 WHERE tenant_id = ?1 AND name = ?2",
                rusqlite::params![tid, name],
                |row| {
                    Ok(LogicalDatabase {
                        id: row.get(0)?,
                        tenant: tenant.to_string(),
                        name: row.get(1)?,
                        data_source: PathBuf::from(row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()
            .map_err(storage_err("Failed to look up database"))?
            .ok_or_else(|| ParleyError::DatabaseNotFound {
                tenant: tenant.to_string(),
                database: name.to_string(),
            })
        })
    }

    /// Resolve the physical data source bound to a logical database.
    pub fn resolve_data_source(&self, tenant: &str, name: &str) -> Result<PathBuf, ParleyError> {
        Ok(self.find_database(tenant, name)?.data_source)
    }

    /// List a tenant's logical databases ordered by name. Unknown tenants have none.
    pub fn list_databases(&self, tenant: &str) -> Result<Vec<LogicalDatabase>, ParleyError> {
        self.db.with_conn(|conn| {
            let Some(tid) = tenant_id(conn, tenant)? else {
                return Ok(Vec::new());
            };
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, data_source FROM logical_databases
                     WHERE tenant_id = ?1 ORDER BY name",
                )
                .map_err(storage_err("Failed to list databases"))?;
            let rows = stmt
                .query_map(rusqlite::params![tid], |row| {
                    Ok(LogicalDatabase {
                        id: row.get(0)?,
                        tenant: tenant.to_string(),
                        name: row.get(1)?,
                        data_source: PathBuf::from(row.get::<_, String>(2)?),
                    })
                })
                .map_err(storage_err("Failed to list databases"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(storage_err("Failed to read database"))
        })
    }

    /// Create a user under an existing tenant.
    ///
    /// Returns the user and its credential token. The token is only
    /// returned here; callers must hand it to the user.
    pub fn create_user(&self, tenant: &str, name: &str) -> Result<(User, String), ParleyError> {
        require_name("User", name)?;
        let token = generate_token();
        let user = self.db.with_conn(|conn| {
            let tid = tenant_id(conn, tenant)?.ok_or_else(|| ParleyError::UnknownTenant(tenant.into()))?;
            conn.execute(
                "INSERT INTO users (tenant_id, name, token) VALUES (?1, ?2, ?3)",
                rusqlite::params![tid, name, token],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ParleyError::Validation(format!(
                        "user '{}' already exists for tenant '{}'",
                        name, tenant
                    ))
                }
                other => ParleyError::Storage(format!("Failed to create user: {}", other)),
            })?;
            Ok(User {
                id: conn.last_insert_rowid(),
                tenant: tenant.to_string(),
                name: name.to_string(),
            })
        })?;
        info!(tenant, user = name, "User created");
        Ok((user, token))
    }

    /// Resolve the user owning `token` within `tenant`.
    pub fn authenticate(&self, tenant: &str, token: &str) -> Result<User, ParleyError> {
        self.db.with_conn(|conn| {
            let tid = tenant_id(conn, tenant)?.ok_or_else(|| ParleyError::UnknownTenant(tenant.into()))?;
            let user = conn
                .query_row(
                    "SELECT id, name FROM users WHERE tenant_id = ?1 AND token = ?2",
                    rusqlite::params![tid, token],
                    |row| {
                        Ok(User {
                            id: row.get(0)?,
                            tenant: tenant.to_string(),
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()
                .map_err(storage_err("Failed to authenticate"))?;
            user.ok_or_else(|| ParleyError::InvalidCredentials(tenant.to_string()))
        })
    }
}

// =============================================================================
// SchemaRepository
// =============================================================================

/// Store of semantic schema descriptions, one per logical database.
#[derive(Clone)]
pub struct SchemaRepository {
    db: Arc<Database>,
}

impl SchemaRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load the schema of a logical database.
    ///
    /// Fails with `SchemaNotFound` when the pair is unregistered or has no schema.
    pub fn get(&self, tenant: &str, database: &str) -> Result<SchemaDocument, ParleyError> {
        let not_found = || ParleyError::SchemaNotFound {
            tenant: tenant.to_string(),
            database: database.to_string(),
        };

        let stored: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT d.schema_json FROM logical_databases d
                 JOIN tenants t ON t.id = d.tenant_id
                 WHERE t.name = ?1 AND d.name = ?2",
                rusqlite::params![tenant, database],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map_err(storage_err("Failed to load schema"))
            .map(Option::flatten)
        })?;

        let json = stored.ok_or_else(not_found)?;
        let doc: SchemaDocument = serde_json::from_str(&json)?;
        if doc.tables.is_empty() {
            return Err(not_found());
        }
        Ok(doc)
    }

    /// Replace the schema of a registered logical database.
    ///
    /// Input that is not a non-empty JSON object is rejected before anything
    /// is written. The update runs in a single transaction.
    pub fn set(
        &self,
        tenant: &str,
        database: &str,
        schema: &serde_json::Value,
    ) -> Result<SchemaDocument, ParleyError> {
        let doc = SchemaDocument::from_json(schema)?;
        let json = serde_json::to_string(&doc)?;

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("Failed to begin transaction"))?;
            let tid = tenant_id(&tx, tenant)?.ok_or_else(|| ParleyError::UnknownTenant(tenant.into()))?;
            let updated = tx
                .execute(
                    "UPDATE logical_databases
                     SET schema_json = ?1, updated_at = strftime('%s', 'now')
                     WHERE tenant_id = ?2 AND name = ?3",
                    rusqlite::params![json, tid, database],
                )
                .map_err(storage_err("Failed to update schema"))?;
            if updated == 0 {
                return Err(ParleyError::DatabaseNotFound {
                    tenant: tenant.to_string(),
                    database: database.to_string(),
                });
            }
            tx.commit().map_err(storage_err("Failed to commit schema"))?;
            Ok(())
        })?;

        debug!(tenant, database, tables = doc.tables.len(), "Schema updated");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_db() -> Arc<Database> {
        Arc::new(Database::in_memory().unwrap())
    }

    fn sample_schema() -> SchemaDocument {
        SchemaDocument::from_json(&json!({
            "orders": {"description": "Customer orders.", "columns": {"id": "Order id."}}
        }))
        .unwrap()
    }

    // ---- Tenants ----

    #[test]
    fn test_ensure_tenant_is_idempotent() {
        let repo = TenantRepository::new(make_db());
        let a = repo.ensure_tenant("acme").unwrap();
        let b = repo.ensure_tenant("acme").unwrap();
        assert_eq!(a, b);
        assert_eq!(repo.list_tenants().unwrap().len(), 1);
    }

    #[test]
    fn test_ensure_tenant_rejects_empty_name() {
        let repo = TenantRepository::new(make_db());
        assert!(matches!(
            repo.ensure_tenant("  "),
            Err(ParleyError::Validation(_))
        ));
    }

    #[test]
    fn test_find_tenant_missing() {
        let repo = TenantRepository::new(make_db());
        assert!(repo.find_tenant("ghost").unwrap().is_none());
    }

    // ---- Logical databases ----

    #[test]
    fn test_register_database_creates_tenant() {
        let repo = TenantRepository::new(make_db());
        let db = repo
            .register_database("acme", "sales", Path::new("data/sales.db"), None)
            .unwrap();
        assert_eq!(db.tenant, "acme");
        assert_eq!(db.name, "sales");
        assert_eq!(db.data_source, PathBuf::from("data/sales.db"));
        assert!(repo.find_tenant("acme").unwrap().is_some());
    }

    #[test]
    fn test_register_database_upserts() {
        let repo = TenantRepository::new(make_db());
        let first = repo
            .register_database("acme", "sales", Path::new("a.db"), None)
            .unwrap();
        let second = repo
            .register_database("acme", "sales", Path::new("b.db"), None)
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.data_source, PathBuf::from("b.db"));
        assert_eq!(repo.list_databases("acme").unwrap().len(), 1);
    }

    #[test]
    fn test_reregister_without_schema_keeps_schema() {
        let db = make_db();
        let repo = TenantRepository::new(Arc::clone(&db));
        let schemas = SchemaRepository::new(db);
        repo.register_database("acme", "sales", Path::new("a.db"), Some(&sample_schema()))
            .unwrap();
        repo.register_database("acme", "sales", Path::new("b.db"), None)
            .unwrap();
        assert_eq!(schemas.get("acme", "sales").unwrap(), sample_schema());
    }

    #[test]
    fn test_find_database_errors() {
        let repo = TenantRepository::new(make_db());
        assert!(matches!(
            repo.find_database("ghost", "sales"),
            Err(ParleyError::UnknownTenant(_))
        ));
        repo.ensure_tenant("acme").unwrap();
        assert!(matches!(
            repo.find_database("acme", "sales"),
            Err(ParleyError::DatabaseNotFound { .. })
        ));
    }

    #[test]
    fn test_same_database_name_isolated_per_tenant() {
        let repo = TenantRepository::new(make_db());
        repo.register_database("acme", "sales", Path::new("acme.db"), None)
            .unwrap();
        repo.register_database("globex", "sales", Path::new("globex.db"), None)
            .unwrap();
        assert_eq!(
            repo.resolve_data_source("acme", "sales").unwrap(),
            PathBuf::from("acme.db")
        );
        assert_eq!(
            repo.resolve_data_source("globex", "sales").unwrap(),
            PathBuf::from("globex.db")
        );
    }

    #[test]
    fn test_list_databases_unknown_tenant_is_empty() {
        let repo = TenantRepository::new(make_db());
        assert!(repo.list_databases("ghost").unwrap().is_empty());
    }

    // ---- Users ----

    #[test]
    fn test_create_user_and_authenticate() {
        let repo = TenantRepository::new(make_db());
        repo.ensure_tenant("acme").unwrap();
        let (user, token) = repo.create_user("acme", "u1").unwrap();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(repo.authenticate("acme", &token).unwrap(), user);
    }

    #[test]
    fn test_authenticate_rejects_other_tenant_token() {
        let repo = TenantRepository::new(make_db());
        repo.ensure_tenant("acme").unwrap();
        repo.ensure_tenant("globex").unwrap();
        let (_, token) = repo.create_user("acme", "u1").unwrap();
        assert!(matches!(
            repo.authenticate("globex", &token),
            Err(ParleyError::InvalidCredentials(_))
        ));
        assert!(matches!(
            repo.authenticate("acme", "not-a-token"),
            Err(ParleyError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_create_user_duplicate_name() {
        let repo = TenantRepository::new(make_db());
        repo.ensure_tenant("acme").unwrap();
        repo.create_user("acme", "u1").unwrap();
        assert!(matches!(
            repo.create_user("acme", "u1"),
            Err(ParleyError::Validation(_))
        ));
    }

    #[test]
    fn test_create_user_unknown_tenant() {
        let repo = TenantRepository::new(make_db());
        assert!(matches!(
            repo.create_user("ghost", "u1"),
            Err(ParleyError::UnknownTenant(_))
        ));
    }

    #[test]
    fn test_generate_token_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    // ---- Schemas ----

    #[test]
    fn test_schema_get_unregistered() {
        let schemas = SchemaRepository::new(make_db());
        assert!(matches!(
            schemas.get("acme", "sales"),
            Err(ParleyError::SchemaNotFound { .. })
        ));
    }

    #[test]
    fn test_schema_get_registered_without_schema() {
        let db = make_db();
        TenantRepository::new(Arc::clone(&db))
            .register_database("acme", "sales", Path::new("a.db"), None)
            .unwrap();
        let schemas = SchemaRepository::new(db);
        assert!(matches!(
            schemas.get("acme", "sales"),
            Err(ParleyError::SchemaNotFound { .. })
        ));
    }

    #[test]
    fn test_schema_set_and_get() {
        let db = make_db();
        TenantRepository::new(Arc::clone(&db))
            .register_database("acme", "sales", Path::new("a.db"), None)
            .unwrap();
        let schemas = SchemaRepository::new(db);
        let doc = schemas
            .set("acme", "sales", &json!({"orders": "Customer orders."}))
            .unwrap();
        assert_eq!(schemas.get("acme", "sales").unwrap(), doc);
    }

    #[test]
    fn test_schema_set_rejects_invalid_input_without_writing() {
        let db = make_db();
        TenantRepository::new(Arc::clone(&db))
            .register_database("acme", "sales", Path::new("a.db"), Some(&sample_schema()))
            .unwrap();
        let schemas = SchemaRepository::new(db);

        assert!(matches!(
            schemas.set("acme", "sales", &json!({})),
            Err(ParleyError::Validation(_))
        ));
        assert!(matches!(
            schemas.set("acme", "sales", &json!("orders")),
            Err(ParleyError::Validation(_))
        ));
        assert!(matches!(
            schemas.set("acme", "sales", &json!({"orders": "ok", "bad": 7})),
            Err(ParleyError::Validation(_))
        ));
        assert_eq!(schemas.get("acme", "sales").unwrap(), sample_schema());
    }

    #[test]
    fn test_schema_set_unregistered_database() {
        let db = make_db();
        TenantRepository::new(Arc::clone(&db))
            .ensure_tenant("acme")
            .unwrap();
        let schemas = SchemaRepository::new(db);
        assert!(matches!(
            schemas.set("acme", "sales", &json!({"orders": "x"})),
            Err(ParleyError::DatabaseNotFound { .. })
        ));
    }
}

//! Schema resolution for prompts.

use std::collections::BTreeMap;

use parley_core::schema::{schema_text, SchemaDocument};
use parley_storage::SchemaRepository;
use tracing::info;

use crate::error::ChatError;

/// Resolves (tenant, database) pairs to normalized per-table text.
#[derive(Clone)]
pub struct SchemaResolver {
    schemas: SchemaRepository,
}

impl SchemaResolver {
    pub fn new(schemas: SchemaRepository) -> Self {
        Self { schemas }
    }

    /// Table name to normalized description text.
    ///
    /// Fails with `NotFound` when the pair is unregistered or has no schema.
    pub fn resolve(
        &self,
        tenant: &str,
        database: &str,
    ) -> Result<BTreeMap<String, String>, ChatError> {
        Ok(self.schemas.get(tenant, database)?.render())
    }

    /// The whole schema as one text block, tables ordered by name.
    pub fn resolve_text(&self, tenant: &str, database: &str) -> Result<String, ChatError> {
        Ok(schema_text(&self.resolve(tenant, database)?))
    }

    /// Replace the schema of a registered database.
    ///
    /// Rejects non-object or empty input; the replacement is all-or-nothing.
    pub fn set(
        &self,
        tenant: &str,
        database: &str,
        schema: &serde_json::Value,
    ) -> Result<SchemaDocument, ChatError> {
        let doc = self.schemas.set(tenant, database, schema)?;
        info!(tenant = %tenant, database = %database, tables = doc.tables.len(), "Schema updated");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_storage::{Database, TenantRepository};
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    fn make_resolver() -> SchemaResolver {
        let db = Arc::new(Database::in_memory().unwrap());
        let tenants = TenantRepository::new(Arc::clone(&db));
        tenants.ensure_tenant("acme").unwrap();
        tenants
            .register_database("acme", "sales", Path::new("/tmp/sales.db"), None)
            .unwrap();
        SchemaResolver::new(SchemaRepository::new(db))
    }

    #[test]
    fn test_resolve_unregistered_is_not_found() {
        let resolver = make_resolver();
        assert!(matches!(
            resolver.resolve("acme", "hr"),
            Err(ChatError::NotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("ghost", "sales"),
            Err(ChatError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_registered_without_schema_is_not_found() {
        let resolver = make_resolver();
        assert!(matches!(
            resolver.resolve("acme", "sales"),
            Err(ChatError::NotFound(_))
        ));
    }

    #[test]
    fn test_set_then_resolve() {
        let resolver = make_resolver();
        resolver
            .set(
                "acme",
                "sales",
                &json!({
                    "orders": {
                        "description": "Customer orders.",
                        "columns": {"total": {"type": "REAL", "description": "Amount."}}
                    },
                    "customers": "Buyers."
                }),
            )
            .unwrap();

        let tables = resolver.resolve("acme", "sales").unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables["orders"], "Customer orders.\nColumns:\n- total (REAL): Amount.");

        let text = resolver.resolve_text("acme", "sales").unwrap();
        assert_eq!(
            text,
            "Table customers:\nBuyers.\n\nTable orders:\nCustomer orders.\nColumns:\n- total (REAL): Amount."
        );
    }

    #[test]
    fn test_set_rejects_invalid_input_and_keeps_old_schema() {
        let resolver = make_resolver();
        resolver
            .set("acme", "sales", &json!({"orders": "Orders."}))
            .unwrap();

        for bad in [json!({}), json!([]), json!("orders"), json!(null)] {
            let err = resolver.set("acme", "sales", &bad).unwrap_err();
            assert!(matches!(err, ChatError::Validation(_)));
        }
        assert_eq!(
            resolver.resolve_text("acme", "sales").unwrap(),
            "Table orders:\nOrders."
        );
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let resolver = make_resolver();
        resolver
            .set(
                "acme",
                "sales",
                &json!({"b": "Second.", "a": {"business_rules": "Rule."}}),
            )
            .unwrap();
        let first = resolver.resolve_text("acme", "sales").unwrap();
        let second = resolver.resolve_text("acme", "sales").unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("Table a:\nBusiness rules:\n- Rule."));
    }
}

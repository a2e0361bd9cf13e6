//! Semantic schema descriptions of tenant databases.
//!
//! Stored schemas arrive in two shapes per table: a plain description string,
//! or a structured record with description, columns, business rules and
//! relationships. Both are parsed once into [`TableDescription`] and rendered
//! to a flat, deterministic text block that is fed verbatim into prompts.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

/// Semantic description of every table in one logical database, keyed by table name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDocument {
    pub tables: BTreeMap<String, TableDescription>,
}

/// Description of a single table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableDescription {
    /// Free-text description.
    Text(String),
    /// Record with description, columns, business rules and relationships.
    Structured(StructuredTable),
}

/// Structured table description.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_columns")]
    pub columns: Vec<Column>,
    #[serde(default, deserialize_with = "deserialize_one_or_many")]
    pub business_rules: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_one_or_many")]
    pub relationships: Vec<String>,
}

/// One column of a structured table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl SchemaDocument {
    /// Parse a schema from JSON, rejecting anything that is not a non-empty object.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            ParleyError::Validation("schema must be a JSON object of tables".to_string())
        })?;
        if object.is_empty() {
            return Err(ParleyError::Validation(
                "schema must describe at least one table".to_string(),
            ));
        }
        if object.keys().any(|name| name.trim().is_empty()) {
            return Err(ParleyError::Validation(
                "schema table names cannot be empty".to_string(),
            ));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| ParleyError::Validation(format!("invalid schema: {}", e)))
    }

    /// Render every table to its normalized text block.
    pub fn render(&self) -> BTreeMap<String, String> {
        self.tables
            .iter()
            .map(|(name, table)| (name.clone(), table.render()))
            .collect()
    }
}

impl TableDescription {
    /// Normalize to a single text block.
    ///
    /// Field order is fixed: description, columns, business rules, relationships.
    pub fn render(&self) -> String {
        match self {
            TableDescription::Text(text) => text.trim().to_string(),
            TableDescription::Structured(table) => table.render(),
        }
    }
}

impl StructuredTable {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        if let Some(description) = self.description.as_deref().map(str::trim) {
            if !description.is_empty() {
                lines.push(description.to_string());
            }
        }

        if !self.columns.is_empty() {
            lines.push("Columns:".to_string());
            for column in &self.columns {
                lines.push(format!("- {}", column.render()));
            }
        }

        if !self.business_rules.is_empty() {
            lines.push("Business rules:".to_string());
            lines.extend(self.business_rules.iter().map(|r| format!("- {}", r.trim())));
        }

        if !self.relationships.is_empty() {
            lines.push("Relationships:".to_string());
            lines.extend(self.relationships.iter().map(|r| format!("- {}", r.trim())));
        }

        lines.join("\n")
    }
}

impl Column {
    fn render(&self) -> String {
        match self.data_type.as_deref() {
            Some(data_type) => format!("{} ({}): {}", self.name, data_type, self.description.trim()),
            None => format!("{}: {}", self.name, self.description.trim()),
        }
    }
}

/// Join rendered table blocks into the schema text used in prompts.
pub fn schema_text(tables: &BTreeMap<String, String>) -> String {
    tables
        .iter()
        .map(|(name, block)| format!("Table {}:\n{}", name, block))
        .collect::<Vec<_>>()
        .join("\n\n")
}

// =============================================================================
// Deserialization helpers
// =============================================================================

/// Accepts a list of `{name, type, description}` records, or an object mapping
/// column name to either a description string or `{type, description}`.
/// Object entries keep their document order.
fn deserialize_columns<'de, D>(deserializer: D) -> std::result::Result<Vec<Column>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ColumnSpec {
        Description(String),
        Detailed {
            #[serde(rename = "type", default)]
            data_type: Option<String>,
            #[serde(default)]
            description: String,
        },
    }

    struct ColumnsVisitor;

    impl<'de> Visitor<'de> for ColumnsVisitor {
        type Value = Vec<Column>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a list of columns or an object of column descriptions")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
            let mut columns = Vec::new();
            while let Some(column) = seq.next_element::<Column>()? {
                columns.push(column);
            }
            Ok(columns)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut columns = Vec::new();
            while let Some((name, spec)) = map.next_entry::<String, ColumnSpec>()? {
                let column = match spec {
                    ColumnSpec::Description(description) => Column {
                        name,
                        data_type: None,
                        description,
                    },
                    ColumnSpec::Detailed {
                        data_type,
                        description,
                    } => Column {
                        name,
                        data_type,
                        description,
                    },
                };
                columns.push(column);
            }
            Ok(columns)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(ColumnsVisitor)
}

fn deserialize_one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(item) if item.trim().is_empty() => Vec::new(),
        OneOrMany::One(item) => vec![item],
        OneOrMany::Many(items) => items,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}

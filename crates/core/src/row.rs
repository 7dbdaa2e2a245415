use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::RowId;

pub const ID_FIELD: &str = "id";
const KEY_SEPARATOR: &str = "|||";

/// One parts-order record.
///
/// Rows are values: editing a field produces a new `Row`, so a copy handed to
/// a reader never changes underneath it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row {
    id: Option<RowId>,
    fields: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn new(id: Option<RowId>) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_fields<K, V>(id: Option<RowId>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self {
            id,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn id(&self) -> Option<RowId> {
        self.id
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Missing fields read as `Null`.
    pub fn get(&self, field: &str) -> FieldValue {
        self.fields.get(field).cloned().unwrap_or_default()
    }

    pub fn with_field(&self, field: &str, value: FieldValue) -> Row {
        let mut fields = self.fields.clone();
        fields.insert(field.to_string(), value);
        Row { id: self.id, fields }
    }

    pub fn with_id(&self, id: Option<RowId>) -> Row {
        Row {
            id,
            fields: self.fields.clone(),
        }
    }

    /// Builds a row from a flat backend record. The `id` member, when it holds
    /// an integer, becomes the durable id; every other member is a field.
    pub fn from_json_object(
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Row, CoreError> {
        let id = match object.get(ID_FIELD) {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(RowId::parse_json(value)?),
        };
        let fields = object
            .iter()
            .filter(|(k, _)| k.as_str() != ID_FIELD)
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect();
        Ok(Row { id, fields })
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Row, CoreError> {
        match value {
            serde_json::Value::Object(object) => Self::from_json_object(object),
            other => Err(CoreError::InvalidData(format!(
                "expected a JSON object for a row, got {other}"
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        if let Some(id) = self.id {
            object.insert(ID_FIELD.to_string(), serde_json::Value::from(id.get()));
        }
        for (k, v) in &self.fields {
            object.insert(k.clone(), v.to_json());
        }
        serde_json::Value::Object(object)
    }
}

/// Composite natural key, e.g. `PEDIDO|||ITEM`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(String);

impl RowKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({})", self.0)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which business fields make up a composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    fields: Vec<String>,
}

impl KeyScheme {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Order number + line item.
    pub fn pedido_item() -> Self {
        Self::new(["PEDIDO", "ITEM"])
    }

    /// Order number + claim number.
    pub fn pedido_siniestro() -> Self {
        Self::new(["PEDIDO", "SINIESTRO"])
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Parts are trimmed and upper-cased. A key whose parts are all empty is
    /// no key at all.
    pub fn key_for(&self, row: &Row) -> Option<RowKey> {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|f| row.get(f).normalize().trim().to_uppercase())
            .collect();
        if parts.iter().all(|p| p.is_empty()) {
            return None;
        }
        Some(RowKey(parts.join(KEY_SEPARATOR)))
    }
}

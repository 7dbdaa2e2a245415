//! Collaborators the engine talks to and the payloads it exchanges with them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ordersync_core::{FieldValue, Row, RowId};

// ============================================================================
// Wire types
// ============================================================================

/// Body of a single-field update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub id: RowId,
    pub field: String,
    pub value: FieldValue,
}

/// Backend acknowledgement. `ok: false` counts as a failure even when the
/// transport itself succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutationResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mensaje: Option<String>,
}

impl MutationResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            mensaje: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            mensaje: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<(), RemoteError> {
        if self.ok {
            Ok(())
        } else {
            Err(RemoteError::Rejected(
                self.mensaje.unwrap_or_else(|| "update rejected".to_string()),
            ))
        }
    }
}

/// Rows sent for promotion, serialized as a bare JSON array of flat objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromotionBatch {
    pub rows: Vec<serde_json::Value>,
}

impl PromotionBatch {
    pub fn from_rows(rows: &[Row]) -> Self {
        Self {
            rows: rows.iter().map(Row::to_json).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The backend answered but refused the write.
    #[error("{0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

// ============================================================================
// Collaborators
// ============================================================================

#[async_trait]
pub trait MutationService: Send + Sync {
    async fn persist(&self, request: &MutationRequest) -> Result<MutationResponse, RemoteError>;
}

#[async_trait]
pub trait PromotionService: Send + Sync {
    async fn insert(&self, batch: &PromotionBatch) -> Result<MutationResponse, RemoteError>;
}

/// User-facing alerts.
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

/// Drops every alert. For headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn alert(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_flat() {
        let req = MutationRequest {
            id: RowId::new(12),
            field: "LOCALIDAD".into(),
            value: "local".into(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"id": 12, "field": "LOCALIDAD", "value": "local"})
        );
    }

    #[test]
    fn not_ok_is_an_error_with_backend_message() {
        let resp: MutationResponse =
            serde_json::from_value(json!({"ok": false, "mensaje": "bloqueado"})).unwrap();
        assert_eq!(resp.into_result(), Err(RemoteError::Rejected("bloqueado".into())));

        let bare: MutationResponse = serde_json::from_value(json!({})).unwrap();
        assert!(bare.into_result().is_err());
    }

    #[test]
    fn ok_response() {
        let resp: MutationResponse = serde_json::from_value(json!({"ok": true})).unwrap();
        assert_eq!(resp.into_result(), Ok(()));
    }

    #[test]
    fn batch_is_a_bare_array() {
        let rows = vec![Row::with_fields(None, [("PEDIDO", "P1")])];
        let batch = PromotionBatch::from_rows(&rows);
        assert_eq!(serde_json::to_value(&batch).unwrap(), json!([{"PEDIDO": "P1"}]));
    }
}

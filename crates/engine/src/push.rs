use serde::{Deserialize, Serialize};

use ordersync_core::{FieldValue, RowId};

use crate::error::EngineError;

/// Inbound notification from the push channel. Any writer's change arrives
/// here, this client's own included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushEvent {
    /// Status-column change from the tracking views.
    #[serde(rename = "estatus_update")]
    StatusUpdate(FieldUpdate),

    /// Any other single-cell change.
    #[serde(rename = "celda_actualizada")]
    CellUpdated(FieldUpdate),

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub id: RowId,
    pub field: String,
    #[serde(default)]
    pub value: FieldValue,
}

impl PushEvent {
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Field-update events are the only ones echo suppression applies to.
    pub fn field_update(&self) -> Option<&FieldUpdate> {
        match self {
            PushEvent::StatusUpdate(update) | PushEvent::CellUpdated(update) => Some(update),
            PushEvent::Unknown => None,
        }
    }
}

/// What the engine did with a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushDisposition {
    /// Written into the row store.
    Applied,
    /// The row already held that value.
    Unchanged,
    /// Dropped as the echo of a recent local write.
    Suppressed,
    /// The engine cannot apply it in place; the dataset must be reloaded.
    ReloadRequired,
}

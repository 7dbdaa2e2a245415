use ordersync_core::{FieldValue, Row, RowId};

use crate::error::EditError;
use crate::undo::UndoEntry;

/// Where an edit came from. Undo replays carry the entry they consumed so a
/// failed replay can put it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    UserEdit,
    UndoReplay(UndoEntry),
}

/// One cell change as the grid reports it.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub row: Row,
    pub field: String,
    pub old_value: FieldValue,
    pub new_value: FieldValue,
    /// Debounce the write. `None` lets the field's schema decide.
    pub live: Option<bool>,
    pub origin: Origin,
}

impl EditRequest {
    pub fn new(
        row: Row,
        field: impl Into<String>,
        old_value: impl Into<FieldValue>,
        new_value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            row,
            field: field.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
            live: None,
            origin: Origin::UserEdit,
        }
    }

    pub fn live(mut self, live: bool) -> Self {
        self.live = Some(live);
        self
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Terminal state of one submitted edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// `network` is false for a no-op that only re-applied the canonical form.
    Committed { applied: FieldValue, network: bool },
    /// `restored` is what the field shows now.
    RolledBack { error: EditError, restored: FieldValue },
    /// A later edit to the same cell replaced this one before it was sent.
    Superseded,
}

impl EditOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EditOutcome::Committed { .. })
    }

    pub fn applied_value(&self) -> Option<&FieldValue> {
        match self {
            EditOutcome::Committed { applied, .. } => Some(applied),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&EditError> {
        match self {
            EditOutcome::RolledBack { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The replay committed and the field now holds this value.
    Applied(FieldValue),
    Empty,
    /// The entry's row could not be found; the entry was kept.
    RowNotFound,
    /// The replay failed; the entry was kept.
    Failed(EditError),
}

/// A debounced cell: one field of one persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub row_id: RowId,
    pub field: String,
}

impl CellKey {
    pub fn new(row_id: RowId, field: impl Into<String>) -> Self {
        Self {
            row_id,
            field: field.into(),
        }
    }
}

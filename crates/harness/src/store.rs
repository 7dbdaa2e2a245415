use parking_lot::Mutex;

use ordersync_core::{FieldValue, Row, RowId};
use ordersync_storage::{MemoryRowStore, RowHandle, RowStore, StorageError, StoredRow};

/// In-memory store whose next removal can be made to fail.
#[derive(Default)]
pub struct FlakyRowStore {
    inner: MemoryRowStore,
    fail_remove: Mutex<Option<String>>,
}

impl FlakyRowStore {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            inner: MemoryRowStore::with_rows(rows),
            fail_remove: Mutex::new(None),
        }
    }

    /// Next `remove_rows` call errors and removes nothing.
    pub fn fail_next_remove(&self, message: &str) {
        *self.fail_remove.lock() = Some(message.to_string());
    }
}

impl RowStore for FlakyRowStore {
    fn snapshot(&self) -> Result<Vec<StoredRow>, StorageError> {
        self.inner.snapshot()
    }

    fn find_by_id(&self, id: RowId) -> Result<Option<StoredRow>, StorageError> {
        self.inner.find_by_id(id)
    }

    fn get(&self, handle: RowHandle) -> Result<Option<Row>, StorageError> {
        self.inner.get(handle)
    }

    fn modify_field(
        &self,
        handle: RowHandle,
        field: &str,
        f: &mut dyn FnMut(&FieldValue) -> Option<FieldValue>,
    ) -> Result<Option<Row>, StorageError> {
        self.inner.modify_field(handle, field, f)
    }

    fn insert_rows(&self, rows: Vec<Row>) -> Result<Vec<RowHandle>, StorageError> {
        self.inner.insert_rows(rows)
    }

    fn remove_rows(&self, handles: &[RowHandle]) -> Result<usize, StorageError> {
        if let Some(message) = self.fail_remove.lock().take() {
            return Err(StorageError::Serialization(message));
        }
        self.inner.remove_rows(handles)
    }

    fn replace_all(&self, rows: Vec<Row>) -> Result<Vec<RowHandle>, StorageError> {
        self.inner.replace_all(rows)
    }

    fn len(&self) -> Result<usize, StorageError> {
        self.inner.len()
    }
}

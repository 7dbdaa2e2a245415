use parking_lot::Mutex;

use ordersync_core::{FieldValue, Row, RowId};

use crate::error::StorageError;
use crate::store::{RowHandle, RowStore, StoredRow};

#[derive(Default)]
struct Inner {
    rows: Vec<StoredRow>,
    next_handle: u64,
}

impl Inner {
    fn push(&mut self, row: Row) -> RowHandle {
        self.next_handle += 1;
        let handle = RowHandle::new(self.next_handle);
        self.rows.push(StoredRow { handle, row });
        handle
    }

    fn position(&self, handle: RowHandle) -> Option<usize> {
        self.rows.iter().position(|s| s.handle == handle)
    }
}

/// Vec-backed store. What the engine uses when nothing outlives the session.
#[derive(Default)]
pub struct MemoryRowStore {
    inner: Mutex<Inner>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock();
            for row in rows {
                inner.push(row);
            }
        }
        store
    }
}

impl RowStore for MemoryRowStore {
    fn snapshot(&self) -> Result<Vec<StoredRow>, StorageError> {
        Ok(self.inner.lock().rows.clone())
    }

    fn find_by_id(&self, id: RowId) -> Result<Option<StoredRow>, StorageError> {
        Ok(self
            .inner
            .lock()
            .rows
            .iter()
            .find(|s| s.row.id() == Some(id))
            .cloned())
    }

    fn get(&self, handle: RowHandle) -> Result<Option<Row>, StorageError> {
        let inner = self.inner.lock();
        Ok(inner.position(handle).map(|i| inner.rows[i].row.clone()))
    }

    fn modify_field(
        &self,
        handle: RowHandle,
        field: &str,
        f: &mut dyn FnMut(&FieldValue) -> Option<FieldValue>,
    ) -> Result<Option<Row>, StorageError> {
        let mut inner = self.inner.lock();
        let Some(i) = inner.position(handle) else {
            return Ok(None);
        };
        let stored = &mut inner.rows[i];
        let Some(value) = f(&stored.row.get(field)) else {
            return Ok(None);
        };
        stored.row = stored.row.with_field(field, value);
        Ok(Some(stored.row.clone()))
    }

    fn insert_rows(&self, rows: Vec<Row>) -> Result<Vec<RowHandle>, StorageError> {
        let mut inner = self.inner.lock();
        Ok(rows.into_iter().map(|row| inner.push(row)).collect())
    }

    fn remove_rows(&self, handles: &[RowHandle]) -> Result<usize, StorageError> {
        let mut inner = self.inner.lock();
        let before = inner.rows.len();
        inner.rows.retain(|s| !handles.contains(&s.handle));
        Ok(before - inner.rows.len())
    }

    fn replace_all(&self, rows: Vec<Row>) -> Result<Vec<RowHandle>, StorageError> {
        let mut inner = self.inner.lock();
        inner.rows.clear();
        Ok(rows.into_iter().map(|row| inner.push(row)).collect())
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.inner.lock().rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[test]
    fn insert_then_snapshot_keeps_order() {
        contract::insert_then_snapshot_keeps_order(&MemoryRowStore::new());
    }

    #[test]
    fn find_by_id_and_key() {
        contract::find_by_id_and_key(&MemoryRowStore::new());
    }

    #[test]
    fn modify_field_is_conditional() {
        contract::modify_field_is_conditional(&MemoryRowStore::new());
    }

    #[test]
    fn removed_handles_stop_matching() {
        contract::removed_handles_stop_matching(&MemoryRowStore::new());
    }

    #[test]
    fn replace_all_discards_previous() {
        contract::replace_all_discards_previous(&MemoryRowStore::new());
    }

    #[test]
    fn with_rows_preloads() {
        let store = MemoryRowStore::with_rows(vec![contract::order(1, "P1", "a")]);
        assert_eq!(store.len().unwrap(), 1);
    }
}

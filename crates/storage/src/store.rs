use std::fmt;

use ordersync_core::{FieldValue, KeyScheme, Row, RowId, RowKey};

use crate::error::StorageError;

/// Position of a row inside one store. Stable for the life of the row and
/// never reused, so a stale handle simply stops matching.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowHandle(u64);

impl RowHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowHandle({})", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub handle: RowHandle,
    pub row: Row,
}

/// The in-memory dataset a client works on. Every call is atomic with respect
/// to every other call on the same store.
pub trait RowStore: Send + Sync {
    /// All rows in dataset order.
    fn snapshot(&self) -> Result<Vec<StoredRow>, StorageError>;

    /// First row carrying `id`.
    fn find_by_id(&self, id: RowId) -> Result<Option<StoredRow>, StorageError>;

    fn get(&self, handle: RowHandle) -> Result<Option<Row>, StorageError>;

    /// Read-modify-write of one field. `f` sees the current value and returns
    /// the replacement, or `None` to leave the row alone. Returns the updated
    /// row when a write happened.
    fn modify_field(
        &self,
        handle: RowHandle,
        field: &str,
        f: &mut dyn FnMut(&FieldValue) -> Option<FieldValue>,
    ) -> Result<Option<Row>, StorageError>;

    fn insert_rows(&self, rows: Vec<Row>) -> Result<Vec<RowHandle>, StorageError>;

    /// Returns how many of `handles` were present.
    fn remove_rows(&self, handles: &[RowHandle]) -> Result<usize, StorageError>;

    /// Discard everything and load `rows`. Used on a full reload.
    fn replace_all(&self, rows: Vec<Row>) -> Result<Vec<RowHandle>, StorageError>;

    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// First row whose composite key under `scheme` equals `key`.
    fn find_by_key(
        &self,
        scheme: &KeyScheme,
        key: &RowKey,
    ) -> Result<Option<StoredRow>, StorageError> {
        Ok(self
            .snapshot()?
            .into_iter()
            .find(|stored| scheme.key_for(&stored.row).as_ref() == Some(key)))
    }

    fn set_field(
        &self,
        handle: RowHandle,
        field: &str,
        value: FieldValue,
    ) -> Result<Option<Row>, StorageError> {
        let mut value = Some(value);
        self.modify_field(handle, field, &mut |_| value.take())
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behavior every `RowStore` must show. Each backend's tests call these.

    use super::*;

    pub fn order(id: i64, pedido: &str, item: &str) -> Row {
        Row::with_fields(Some(RowId::new(id)), [("PEDIDO", pedido), ("ITEM", item)])
    }

    pub fn insert_then_snapshot_keeps_order(store: &dyn RowStore) {
        let handles = store
            .insert_rows(vec![order(1, "P1", "a"), order(2, "P1", "b"), order(3, "P2", "a")])
            .unwrap();
        assert_eq!(handles.len(), 3);
        let snap = store.snapshot().unwrap();
        let ids: Vec<_> = snap.iter().map(|s| s.row.id().unwrap().get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(snap[1].handle, handles[1]);
        assert_eq!(store.len().unwrap(), 3);
    }

    pub fn find_by_id_and_key(store: &dyn RowStore) {
        store
            .insert_rows(vec![order(7, "P1", "faro"), order(8, "p1 ", "FARO")])
            .unwrap();
        let found = store.find_by_id(RowId::new(8)).unwrap().unwrap();
        assert_eq!(found.row.id(), Some(RowId::new(8)));
        assert!(store.find_by_id(RowId::new(99)).unwrap().is_none());

        let scheme = KeyScheme::pedido_item();
        let key = scheme.key_for(&order(0, "P1", "faro")).unwrap();
        let first = store.find_by_key(&scheme, &key).unwrap().unwrap();
        assert_eq!(first.row.id(), Some(RowId::new(7)));
    }

    pub fn modify_field_is_conditional(store: &dyn RowStore) {
        let handle = store.insert_rows(vec![order(1, "P1", "a")]).unwrap()[0];
        let updated = store
            .set_field(handle, "CODIGO", FieldValue::from("X1"))
            .unwrap()
            .unwrap();
        assert_eq!(updated.get("CODIGO"), FieldValue::from("X1"));

        let declined = store
            .modify_field(handle, "CODIGO", &mut |current| {
                (current == &FieldValue::from("other")).then(|| FieldValue::from("Y"))
            })
            .unwrap();
        assert!(declined.is_none());
        assert_eq!(
            store.get(handle).unwrap().unwrap().get("CODIGO"),
            FieldValue::from("X1")
        );
    }

    pub fn removed_handles_stop_matching(store: &dyn RowStore) {
        let handles = store
            .insert_rows(vec![order(1, "P1", "a"), order(2, "P1", "b")])
            .unwrap();
        assert_eq!(store.remove_rows(&handles[..1]).unwrap(), 1);
        assert_eq!(store.remove_rows(&handles[..1]).unwrap(), 0);
        assert!(store.get(handles[0]).unwrap().is_none());
        assert!(
            store
                .set_field(handles[0], "CODIGO", FieldValue::from("Z"))
                .unwrap()
                .is_none()
        );

        let fresh = store.insert_rows(vec![order(3, "P3", "c")]).unwrap();
        assert_ne!(fresh[0], handles[0]);
    }

    pub fn replace_all_discards_previous(store: &dyn RowStore) {
        let old = store.insert_rows(vec![order(1, "P1", "a")]).unwrap();
        store.replace_all(vec![order(5, "P5", "x"), order(6, "P6", "y")]).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert!(store.get(old[0]).unwrap().is_none());
        assert!(store.find_by_id(RowId::new(1)).unwrap().is_none());
    }
}

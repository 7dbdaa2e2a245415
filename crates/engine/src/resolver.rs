use ordersync_core::{KeyScheme, Row, RowId, RowKey};
use ordersync_storage::{RowStore, StorageError, StoredRow};

/// How a logical row can be found again after the dataset has been
/// reordered, filtered or reloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIdentity {
    pub id: Option<RowId>,
    pub key: Option<RowKey>,
}

impl RowIdentity {
    pub fn resolve(row: &Row, scheme: &KeyScheme) -> Self {
        Self {
            id: row.id(),
            key: scheme.key_for(row),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.key.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    ById(StoredRow),
    ByKey(StoredRow),
    NotFound,
}

impl Resolution {
    pub fn into_found(self) -> Option<StoredRow> {
        match self {
            Resolution::ById(stored) | Resolution::ByKey(stored) => Some(stored),
            Resolution::NotFound => None,
        }
    }
}

/// Exact id first, composite key second.
pub fn locate(
    store: &dyn RowStore,
    scheme: &KeyScheme,
    identity: &RowIdentity,
) -> Result<Resolution, StorageError> {
    if let Some(id) = identity.id
        && let Some(stored) = store.find_by_id(id)?
    {
        return Ok(Resolution::ById(stored));
    }
    if let Some(key) = &identity.key
        && let Some(stored) = store.find_by_key(scheme, key)?
    {
        return Ok(Resolution::ByKey(stored));
    }
    Ok(Resolution::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordersync_storage::MemoryRowStore;

    fn row(id: Option<i64>, pedido: &str, item: &str) -> Row {
        Row::with_fields(id.map(RowId::new), [("PEDIDO", pedido), ("ITEM", item)])
    }

    #[test]
    fn id_wins_over_key() {
        let store = MemoryRowStore::with_rows(vec![row(Some(1), "P1", "a"), row(Some(2), "P2", "b")]);
        let scheme = KeyScheme::pedido_item();
        // Identity whose id points at row 2 but whose key matches row 1.
        let identity = RowIdentity {
            id: Some(RowId::new(2)),
            key: scheme.key_for(&row(None, "P1", "a")),
        };
        let found = locate(&store, &scheme, &identity).unwrap();
        match found {
            Resolution::ById(stored) => assert_eq!(stored.row.id(), Some(RowId::new(2))),
            other => panic!("expected ById, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_key_when_id_is_gone() {
        let store = MemoryRowStore::with_rows(vec![row(Some(10), "P1", "a")]);
        let scheme = KeyScheme::pedido_item();
        let identity = RowIdentity::resolve(&row(Some(99), " p1", "A "), &scheme);
        assert!(matches!(
            locate(&store, &scheme, &identity).unwrap(),
            Resolution::ByKey(_)
        ));
    }

    #[test]
    fn neither_resolves_is_not_found() {
        let store = MemoryRowStore::with_rows(vec![row(Some(10), "P1", "a")]);
        let scheme = KeyScheme::pedido_item();
        let identity = RowIdentity::resolve(&row(Some(11), "P9", "z"), &scheme);
        assert_eq!(locate(&store, &scheme, &identity).unwrap(), Resolution::NotFound);
    }

    #[test]
    fn empty_identity() {
        let identity = RowIdentity::resolve(&row(None, "", ""), &KeyScheme::pedido_item());
        assert!(identity.is_empty());
    }
}

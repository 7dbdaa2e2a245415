use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use ordersync_core::{FieldValue, Row, RowId};

use crate::error::StorageError;
use crate::store::{RowHandle, RowStore, StoredRow};

type Fields = BTreeMap<String, FieldValue>;

fn encode_fields(row: &Row) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec(row.fields()).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_fields(bytes: &[u8]) -> Result<Fields, StorageError> {
    rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn handle_from_sql(raw: i64) -> RowHandle {
    RowHandle::new(raw as u64)
}

fn handle_to_sql(handle: RowHandle) -> i64 {
    handle.get() as i64
}

/// Reads `(handle, row_id, fields)` columns.
fn read_row(row: &rusqlite::Row) -> Result<StoredRow, StorageError> {
    let handle: i64 = row.get(0)?;
    let row_id: Option<i64> = row.get(1)?;
    let blob: Vec<u8> = row.get(2)?;
    let fields = decode_fields(&blob)?;
    Ok(StoredRow {
        handle: handle_from_sql(handle),
        row: Row::with_fields(row_id.map(RowId::new), fields),
    })
}

/// Store persisted in a SQLite file, so a crashed client reopens with the
/// rows it last saw. Field maps are stored as MessagePack blobs.
pub struct SqliteRowStore {
    conn: Mutex<Connection>,
}

impl SqliteRowStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert_with(conn: &Connection, rows: Vec<Row>) -> Result<Vec<RowHandle>, StorageError> {
        let mut stmt = conn.prepare_cached("INSERT INTO rows (row_id, fields) VALUES (?1, ?2)")?;
        let mut handles = Vec::with_capacity(rows.len());
        for row in rows {
            let blob = encode_fields(&row)?;
            stmt.execute(params![row.id().map(|id| id.get()), blob])?;
            handles.push(handle_from_sql(conn.last_insert_rowid()));
        }
        Ok(handles)
    }
}

impl RowStore for SqliteRowStore {
    fn snapshot(&self) -> Result<Vec<StoredRow>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT handle, row_id, fields FROM rows ORDER BY handle")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(row)?);
        }
        Ok(out)
    }

    fn find_by_id(&self, id: RowId) -> Result<Option<StoredRow>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT handle, row_id, fields FROM rows WHERE row_id = ?1 ORDER BY handle LIMIT 1",
        )?;
        let mut rows = stmt.query(params![id.get()])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_row(row)?)),
            None => Ok(None),
        }
    }

    fn get(&self, handle: RowHandle) -> Result<Option<Row>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT handle, row_id, fields FROM rows WHERE handle = ?1")?;
        let mut rows = stmt.query(params![handle_to_sql(handle)])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_row(row)?.row)),
            None => Ok(None),
        }
    }

    fn modify_field(
        &self,
        handle: RowHandle,
        field: &str,
        f: &mut dyn FnMut(&FieldValue) -> Option<FieldValue>,
    ) -> Result<Option<Row>, StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let found: Option<(Option<i64>, Vec<u8>)> = tx
            .query_row(
                "SELECT row_id, fields FROM rows WHERE handle = ?1",
                params![handle_to_sql(handle)],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((row_id, blob)) = found else {
            return Ok(None);
        };
        let row = Row::with_fields(row_id.map(RowId::new), decode_fields(&blob)?);
        let Some(value) = f(&row.get(field)) else {
            return Ok(None);
        };
        let updated = row.with_field(field, value);
        tx.execute(
            "UPDATE rows SET fields = ?1 WHERE handle = ?2",
            params![encode_fields(&updated)?, handle_to_sql(handle)],
        )?;
        tx.commit()?;
        Ok(Some(updated))
    }

    fn insert_rows(&self, rows: Vec<Row>) -> Result<Vec<RowHandle>, StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let handles = Self::insert_with(&tx, rows)?;
        tx.commit()?;
        Ok(handles)
    }

    fn remove_rows(&self, handles: &[RowHandle]) -> Result<usize, StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM rows WHERE handle = ?1")?;
            for handle in handles {
                removed += stmt.execute(params![handle_to_sql(*handle)])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn replace_all(&self, rows: Vec<Row>) -> Result<Vec<RowHandle>, StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM rows", [])?;
        let handles = Self::insert_with(&tx, rows)?;
        tx.commit()?;
        Ok(handles)
    }

    fn len(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM rows", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

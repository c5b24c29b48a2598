//! Implement the Database trait with an in-memory store.
//! This means no persistence.

use parking_lot::RwLock;
use std::{
    any::Any,
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};
use wv_types::{DBIter, Database, DbTx, DbTxMut, Table};

type TableHandle<T> = Arc<RwLock<BTreeMap<<T as Table>::Key, <T as Table>::Value>>>;

/// An in-memory [`Database`]. Each table is a typed ordered map behind its
/// own lock, so readers never serialize against writers of other tables.
#[derive(Clone)]
pub struct MemDatabase {
    tables: Arc<RwLock<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>>,
}

impl MemDatabase {
    /// A database with no tables open.
    pub fn new() -> Self {
        Self { tables: Arc::new(RwLock::new(HashMap::new())) }
    }

    fn handle<T: Table>(&self) -> eyre::Result<TableHandle<T>> {
        let tables = self.tables.read();
        let table =
            tables.get(T::NAME).ok_or_else(|| eyre::eyre!("table {} not open", T::NAME))?.clone();
        table
            .downcast::<RwLock<BTreeMap<T::Key, T::Value>>>()
            .map_err(|_| eyre::eyre!("table {} opened under a different type", T::NAME))
    }
}

impl Default for MemDatabase {
    /// A database with the chain tables open, ready for tests.
    fn default() -> Self {
        let db = Self::new();
        db.open_table::<crate::tables::Blocks>().expect("mem table open cannot fail");
        db.open_table::<crate::tables::ChainTip>().expect("mem table open cannot fail");
        db
    }
}

impl fmt::Debug for MemDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemDatabase")
    }
}

impl Database for MemDatabase {
    type TX<'txn>
        = MemDbTx
    where
        Self: 'txn;

    type TXMut<'txn>
        = MemDbTxMut
    where
        Self: 'txn;

    fn open_table<T: Table>(&self) -> eyre::Result<()> {
        self.tables
            .write()
            .entry(T::NAME)
            .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::<T::Key, T::Value>::new())));
        Ok(())
    }

    fn read_txn(&self) -> eyre::Result<Self::TX<'_>> {
        Ok(MemDbTx { db: self.clone() })
    }

    fn write_txn(&self) -> eyre::Result<Self::TXMut<'_>> {
        Ok(MemDbTxMut { db: self.clone(), ops: Vec::new() })
    }

    fn contains_key<T: Table>(&self, key: &T::Key) -> eyre::Result<bool> {
        Ok(self.handle::<T>()?.read().contains_key(key))
    }

    fn get<T: Table>(&self, key: &T::Key) -> eyre::Result<Option<T::Value>> {
        Ok(self.handle::<T>()?.read().get(key).cloned())
    }

    fn insert<T: Table>(&self, key: &T::Key, value: &T::Value) -> eyre::Result<()> {
        self.handle::<T>()?.write().insert(key.clone(), value.clone());
        Ok(())
    }

    fn remove<T: Table>(&self, key: &T::Key) -> eyre::Result<()> {
        self.handle::<T>()?.write().remove(key);
        Ok(())
    }

    fn is_empty<T: Table>(&self) -> bool {
        self.handle::<T>().map(|table| table.read().is_empty()).unwrap_or(true)
    }

    fn iter<T: Table>(&self) -> DBIter<'_, T> {
        match self.handle::<T>() {
            Ok(table) => {
                let snapshot = table.read().clone();
                Box::new(snapshot.into_iter())
            }
            Err(_) => Box::new(std::iter::empty()),
        }
    }

    fn last_record<T: Table>(&self) -> Option<(T::Key, T::Value)> {
        let table = self.handle::<T>().ok()?;
        let table = table.read();
        table.iter().next_back().map(|(k, v)| (k.clone(), v.clone()))
    }
}

/// Read transaction. Reads go straight at the live tables; this backend does
/// not snapshot.
#[derive(Clone)]
pub struct MemDbTx {
    db: MemDatabase,
}

impl fmt::Debug for MemDbTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemDbTx")
    }
}

impl DbTx for MemDbTx {
    fn get<T: Table>(&self, key: &T::Key) -> eyre::Result<Option<T::Value>> {
        self.db.get::<T>(key)
    }
}

trait WriteOp: Send {
    fn apply(&self, db: &MemDatabase) -> eyre::Result<()>;
}

struct KeyValueInsert<T: Table> {
    key: T::Key,
    value: T::Value,
}

impl<T: Table> WriteOp for KeyValueInsert<T> {
    fn apply(&self, db: &MemDatabase) -> eyre::Result<()> {
        db.insert::<T>(&self.key, &self.value)
    }
}

struct KeyRemove<T: Table> {
    key: T::Key,
}

impl<T: Table> WriteOp for KeyRemove<T> {
    fn apply(&self, db: &MemDatabase) -> eyre::Result<()> {
        db.remove::<T>(&self.key)
    }
}

/// Write transaction. Writes buffer in order and land on commit; reads within
/// the transaction see only committed state.
pub struct MemDbTxMut {
    db: MemDatabase,
    ops: Vec<Box<dyn WriteOp>>,
}

impl fmt::Debug for MemDbTxMut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemDbTxMut")
    }
}

impl DbTx for MemDbTxMut {
    fn get<T: Table>(&self, key: &T::Key) -> eyre::Result<Option<T::Value>> {
        self.db.get::<T>(key)
    }
}

impl DbTxMut for MemDbTxMut {
    fn insert<T: Table>(&mut self, key: &T::Key, value: &T::Value) -> eyre::Result<()> {
        self.ops.push(Box::new(KeyValueInsert::<T> { key: key.clone(), value: value.clone() }));
        Ok(())
    }

    fn remove<T: Table>(&mut self, key: &T::Key) -> eyre::Result<()> {
        self.ops.push(Box::new(KeyRemove::<T> { key: key.clone() }));
        Ok(())
    }

    fn commit(self) -> eyre::Result<()> {
        for op in &self.ops {
            op.apply(&self.db)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemDatabase;
    use crate::test::*;
    use wv_types::Database as _;

    fn open_db() -> MemDatabase {
        let db = MemDatabase::new();
        db.open_table::<TestTable>().expect("failed to open table!");
        db
    }

    #[test]
    fn test_memdb_contains_key() {
        test_contains_key(open_db());
    }

    #[test]
    fn test_memdb_get() {
        test_get(open_db());
    }

    #[test]
    fn test_memdb_remove() {
        test_remove(open_db());
    }

    #[test]
    fn test_memdb_is_empty() {
        test_is_empty(open_db());
    }

    #[test]
    fn test_memdb_iter() {
        test_iter(open_db());
    }

    #[test]
    fn test_memdb_last_record() {
        test_last_record(open_db());
    }

    #[test]
    fn test_memdb_txn_visibility() {
        test_txn_visibility(open_db());
    }

    #[test]
    fn test_memdb_read_txn() {
        test_read_txn(open_db());
    }

    #[test]
    fn test_memdb_unopened_table() {
        test_unopened_table(MemDatabase::new());
    }
}

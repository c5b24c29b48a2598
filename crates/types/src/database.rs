//! Key/value database abstraction implemented by the storage backends.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Bounds every table key must satisfy.
pub trait KeyT: Serialize + DeserializeOwned + Ord + Clone + Send + Sync + Debug + 'static {}
impl<K: Serialize + DeserializeOwned + Ord + Clone + Send + Sync + Debug + 'static> KeyT for K {}

/// Bounds every table value must satisfy.
pub trait ValueT: Serialize + DeserializeOwned + Clone + Send + Sync + Debug + 'static {}
impl<V: Serialize + DeserializeOwned + Clone + Send + Sync + Debug + 'static> ValueT for V {}

/// A typed key/value table.
pub trait Table: Send + Sync + Debug + 'static {
    type Key: KeyT;
    type Value: ValueT;

    /// The name of the table (column family).
    const NAME: &'static str;
}

/// Iterator over the rows of a table.
pub type DBIter<'i, T> = Box<dyn Iterator<Item = (<T as Table>::Key, <T as Table>::Value)> + 'i>;

/// Read access within a transaction.
pub trait DbTx {
    fn get<T: Table>(&self, key: &T::Key) -> eyre::Result<Option<T::Value>>;
}

/// Write access within a transaction. Writes land atomically on commit.
pub trait DbTxMut: DbTx {
    fn insert<T: Table>(&mut self, key: &T::Key, value: &T::Value) -> eyre::Result<()>;
    fn remove<T: Table>(&mut self, key: &T::Key) -> eyre::Result<()>;
    fn commit(self) -> eyre::Result<()>;
}

/// The interface every storage backend implements.
///
/// Single-call reads and writes go through the convenience methods; grouped
/// writes go through [`Database::write_txn`]. Keys order by the key type's own
/// `Ord`, whatever the backend's encoding.
pub trait Database: Clone + Send + Sync + Unpin + 'static {
    type TX<'txn>: DbTx + Send
    where
        Self: 'txn;

    type TXMut<'txn>: DbTxMut + Send
    where
        Self: 'txn;

    /// Create the table if the backend needs that before first use.
    fn open_table<T: Table>(&self) -> eyre::Result<()>;

    fn read_txn(&self) -> eyre::Result<Self::TX<'_>>;
    fn write_txn(&self) -> eyre::Result<Self::TXMut<'_>>;

    fn contains_key<T: Table>(&self, key: &T::Key) -> eyre::Result<bool>;
    fn get<T: Table>(&self, key: &T::Key) -> eyre::Result<Option<T::Value>>;
    fn insert<T: Table>(&self, key: &T::Key, value: &T::Value) -> eyre::Result<()>;
    fn remove<T: Table>(&self, key: &T::Key) -> eyre::Result<()>;

    fn is_empty<T: Table>(&self) -> bool;

    /// Iterate the table in key order. The iterator sees a snapshot taken at
    /// the call.
    fn iter<T: Table>(&self) -> DBIter<'_, T>;

    /// The greatest key and its value, if the table is non-empty.
    fn last_record<T: Table>(&self) -> Option<(T::Key, T::Value)>;
}

use std::collections::BTreeMap;

use pulsevm_serialization::{Read, Write};

mod error;
pub use error::ChainbaseError;

mod undo_session;
pub use undo_session::UndoSession;

/// A row type stored in its own table, keyed by the bytes of its primary key.
pub trait ChainbaseObject: Read + Write {
    type PrimaryKey;

    fn primary_key(&self) -> Vec<u8>;
    fn primary_key_to_bytes(key: Self::PrimaryKey) -> Vec<u8>;
    fn table_name() -> &'static str;
}

pub(crate) enum ObjectChange {
    New {
        table: &'static str,
        key: Vec<u8>,
    },
    Modified {
        table: &'static str,
        key: Vec<u8>,
        old: Vec<u8>,
    },
    Deleted {
        table: &'static str,
        key: Vec<u8>,
        old: Vec<u8>,
    },
}

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-process ordered object store. Rows are packed with `pulsevm_serialization`
/// and tables iterate in key order, so reads are deterministic.
///
/// Writes made while an [`UndoSession`] is open are recorded and reverted if
/// that session is rolled back or dropped.
#[derive(Default)]
pub struct Database {
    tables: BTreeMap<&'static str, Table>,
    undo_stack: Vec<Vec<ObjectChange>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undo_session(&mut self) -> UndoSession<'_> {
        UndoSession::new(self)
    }

    /// Number of open undo sessions.
    pub fn revision(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn exists<T: ChainbaseObject>(&self, key: T::PrimaryKey) -> bool {
        self.tables
            .get(T::table_name())
            .is_some_and(|table| table.contains_key(&T::primary_key_to_bytes(key)))
    }

    pub fn find<T: ChainbaseObject>(
        &self,
        key: T::PrimaryKey,
    ) -> Result<Option<T>, ChainbaseError> {
        let Some(table) = self.tables.get(T::table_name()) else {
            return Ok(None);
        };
        table
            .get(&T::primary_key_to_bytes(key))
            .map(|raw| T::unpack(raw).map_err(|_| ChainbaseError::ReadError(T::table_name())))
            .transpose()
    }

    pub fn get<T: ChainbaseObject>(&self, key: T::PrimaryKey) -> Result<T, ChainbaseError> {
        self.find::<T>(key)?
            .ok_or(ChainbaseError::NotFound(T::table_name()))
    }

    /// All rows of `T` in primary key order.
    pub fn rows<T: ChainbaseObject>(&self) -> Result<Vec<T>, ChainbaseError> {
        let Some(table) = self.tables.get(T::table_name()) else {
            return Ok(Vec::new());
        };
        table
            .values()
            .map(|raw| T::unpack(raw).map_err(|_| ChainbaseError::ReadError(T::table_name())))
            .collect()
    }

    pub fn insert<T: ChainbaseObject>(&mut self, object: &T) -> Result<(), ChainbaseError> {
        let key = object.primary_key();
        let packed = object
            .pack()
            .map_err(|_| ChainbaseError::WriteError(T::table_name()))?;
        let table = self.tables.entry(T::table_name()).or_default();
        if table.contains_key(&key) {
            return Err(ChainbaseError::AlreadyExists(T::table_name()));
        }
        table.insert(key.clone(), packed);
        self.record(ObjectChange::New {
            table: T::table_name(),
            key,
        });
        Ok(())
    }

    pub fn modify<T, F>(&mut self, object: &mut T, f: F) -> Result<(), ChainbaseError>
    where
        T: ChainbaseObject,
        F: FnOnce(&mut T),
    {
        let key = object.primary_key();
        let slot = self
            .tables
            .get_mut(T::table_name())
            .and_then(|table| table.get_mut(&key))
            .ok_or(ChainbaseError::NotFound(T::table_name()))?;
        f(object);
        if object.primary_key() != key {
            return Err(ChainbaseError::WriteError(T::table_name()));
        }
        let packed = object
            .pack()
            .map_err(|_| ChainbaseError::WriteError(T::table_name()))?;
        let old = std::mem::replace(slot, packed);
        self.record(ObjectChange::Modified {
            table: T::table_name(),
            key,
            old,
        });
        Ok(())
    }

    pub fn remove<T: ChainbaseObject>(&mut self, object: &T) -> Result<(), ChainbaseError> {
        let key = object.primary_key();
        let old = self
            .tables
            .get_mut(T::table_name())
            .and_then(|table| table.remove(&key))
            .ok_or(ChainbaseError::NotFound(T::table_name()))?;
        self.record(ObjectChange::Deleted {
            table: T::table_name(),
            key,
            old,
        });
        Ok(())
    }

    fn record(&mut self, change: ObjectChange) {
        if let Some(changes) = self.undo_stack.last_mut() {
            changes.push(change);
        }
    }

    pub(crate) fn push_undo_state(&mut self) {
        self.undo_stack.push(Vec::new());
    }

    /// Folds the newest session into its parent, or makes it permanent when
    /// it is the outermost one.
    pub(crate) fn squash(&mut self) -> Result<(), ChainbaseError> {
        let changes = self.undo_stack.pop().ok_or(ChainbaseError::NoUndoSession)?;
        if let Some(parent) = self.undo_stack.last_mut() {
            parent.extend(changes);
        }
        Ok(())
    }

    pub(crate) fn undo(&mut self) -> Result<(), ChainbaseError> {
        let changes = self.undo_stack.pop().ok_or(ChainbaseError::NoUndoSession)?;
        for change in changes.into_iter().rev() {
            match change {
                ObjectChange::New { table, key } => {
                    if let Some(rows) = self.tables.get_mut(table) {
                        rows.remove(&key);
                    }
                }
                ObjectChange::Modified { table, key, old }
                | ObjectChange::Deleted { table, key, old } => {
                    self.tables.entry(table).or_default().insert(key, old);
                }
            }
        }
        Ok(())
    }
}

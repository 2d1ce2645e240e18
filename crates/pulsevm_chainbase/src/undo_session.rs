use std::ops::{Deref, DerefMut};

use crate::{ChainbaseError, Database};

/// Checkpoint over a [`Database`]. Changes made through the session are kept
/// by [`UndoSession::commit`] and reverted by [`UndoSession::rollback`] or by
/// dropping the session. Sessions nest: committing an inner session hands its
/// changes to the enclosing one.
pub struct UndoSession<'a> {
    db: &'a mut Database,
    active: bool,
}

impl<'a> UndoSession<'a> {
    pub(crate) fn new(db: &'a mut Database) -> Self {
        db.push_undo_state();
        Self { db, active: true }
    }

    pub fn commit(mut self) -> Result<(), ChainbaseError> {
        self.active = false;
        self.db.squash()
    }

    pub fn rollback(mut self) -> Result<(), ChainbaseError> {
        self.active = false;
        self.db.undo()
    }
}

impl Deref for UndoSession<'_> {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        self.db
    }
}

impl DerefMut for UndoSession<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.db
    }
}

impl Drop for UndoSession<'_> {
    fn drop(&mut self) {
        if self.active {
            // The state pushed in `new` is still on the stack, so this cannot fail.
            let _ = self.db.undo();
        }
    }
}

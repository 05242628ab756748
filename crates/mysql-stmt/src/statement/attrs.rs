//! Statement attributes.
//!
//! Three attribute ids are recognized. `UPDATE_MAX_LENGTH` makes the
//! next store pass record per-column maximum value lengths.
//! `CURSOR_TYPE` asks the server to open a cursor on execute instead of
//! streaming rows. `PREFETCH_ROWS` sizes the fetch batches that drain
//! such a cursor. Any other id is rejected, as is a value of the wrong
//! kind for a recognized id.

use crate::error::{Error, Result};

/// Boolean attribute: recompute per-column max lengths on store.
pub const STMT_ATTR_UPDATE_MAX_LENGTH: u32 = 0;
/// Unsigned attribute: cursor type requested at execute.
pub const STMT_ATTR_CURSOR_TYPE: u32 = 1;
/// Unsigned attribute: rows per cursor fetch batch.
pub const STMT_ATTR_PREFETCH_ROWS: u32 = 2;

/// No cursor; rows stream directly after the execute response.
pub const CURSOR_TYPE_NO_CURSOR: u64 = 0;
/// Read-only server-side cursor drained with fetch commands.
pub const CURSOR_TYPE_READ_ONLY: u64 = 1;

/// A statement attribute value. Each attribute id declares which kind
/// it takes; supplying the other kind is a caller error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrValue {
    Bool(bool),
    Uint(u64),
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Uint(v)
    }
}

/// Current attribute settings of one statement.
#[derive(Debug, Clone)]
pub(crate) struct StmtAttrs {
    pub(crate) update_max_length: bool,
    pub(crate) cursor_type: u64,
    pub(crate) prefetch_rows: u64,
}

impl Default for StmtAttrs {
    fn default() -> Self {
        Self {
            update_max_length: false,
            cursor_type: CURSOR_TYPE_NO_CURSOR,
            prefetch_rows: 1,
        }
    }
}

impl StmtAttrs {
    pub(crate) fn get(&self, attr: u32) -> Result<AttrValue> {
        match attr {
            STMT_ATTR_UPDATE_MAX_LENGTH => Ok(AttrValue::Bool(self.update_max_length)),
            STMT_ATTR_CURSOR_TYPE => Ok(AttrValue::Uint(self.cursor_type)),
            STMT_ATTR_PREFETCH_ROWS => Ok(AttrValue::Uint(self.prefetch_rows)),
            other => Err(Error::UnsupportedAttribute { attr: other }),
        }
    }

    pub(crate) fn set(&mut self, attr: u32, value: AttrValue) -> Result<bool> {
        match (attr, value) {
            (STMT_ATTR_UPDATE_MAX_LENGTH, AttrValue::Bool(v)) => {
                self.update_max_length = v;
                Ok(true)
            }
            (STMT_ATTR_UPDATE_MAX_LENGTH, AttrValue::Uint(_)) => Err(Error::AttributeKind {
                attr,
                expected: "boolean",
            }),
            (STMT_ATTR_CURSOR_TYPE, AttrValue::Uint(v)) => {
                self.cursor_type = v;
                Ok(true)
            }
            (STMT_ATTR_PREFETCH_ROWS, AttrValue::Uint(v)) => {
                // Zero would stall the cursor drain loop
                self.prefetch_rows = v.max(1);
                Ok(true)
            }
            (STMT_ATTR_CURSOR_TYPE | STMT_ATTR_PREFETCH_ROWS, AttrValue::Bool(_)) => {
                Err(Error::AttributeKind {
                    attr,
                    expected: "unsigned integer",
                })
            }
            (other, _) => Err(Error::UnsupportedAttribute { attr: other }),
        }
    }
}

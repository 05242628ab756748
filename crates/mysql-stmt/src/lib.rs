//! Prepared statement layer for the MySQL binary protocol.
//!
//! This crate drives server-side prepared statements over a stream that
//! has already completed the MySQL handshake. It provides:
//!
//! - Packet framing with per-command sequence numbers
//! - The statement command set: prepare, execute, fetch, reset,
//!   send-long-data, close
//! - Parameter binding that infers binary wire types from [`Value`]s
//! - Result marshalling from binary row packets back into [`Value`]s
//! - Client-side result buffering with row count and seek
//! - Statement attributes: cursor type, prefetch size, max-length scan
//!
//! The handshake itself, reconnection and pooling stay with the caller;
//! any `Read + Write` stream works, including in-memory doubles for
//! tests.
//!
//! # Error reporting
//!
//! Lifecycle misuse raises an [`Error`]; server refusals and lost
//! connections make the operation return `false` and record
//! diagnostics readable through [`Statement::error_code`],
//! [`Statement::error_message`] and [`Statement::sql_state`].
//!
//! # Example
//!
//! ```rust,ignore
//! use mysql_stmt::{Statement, Value};
//!
//! let stream = std::net::TcpStream::connect(("localhost", 3306))?;
//! // ... handshake elided ...
//! let mut stmt = Statement::new(stream);
//! if stmt.prepare("SELECT id, name FROM users WHERE id = ?")?
//!     && stmt.bind_params(&[Value::Int(42)])?
//!     && stmt.execute()?
//! {
//!     if let Some(rows) = stmt.fetch_all()? {
//!         for row in rows {
//!             println!("{:?}", row.get_by_name("name"));
//!         }
//!     }
//! }
//! stmt.close()?;
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod row;
pub mod statement;
pub mod temporal;
pub mod types;
pub mod value;

pub use config::StatementConfig;
pub use error::{Error, Result, ServerError, TypeError};
pub use row::{ColumnInfo, FromValue, Row};
pub use statement::{
    AttrValue, CURSOR_TYPE_NO_CURSOR, CURSOR_TYPE_READ_ONLY, STMT_ATTR_CURSOR_TYPE,
    STMT_ATTR_PREFETCH_ROWS, STMT_ATTR_UPDATE_MAX_LENGTH, Statement,
};
pub use temporal::{TemporalConvention, WireDateTime};
pub use types::{ColumnMeta, ResultMetadata, WireType};
pub use value::Value;

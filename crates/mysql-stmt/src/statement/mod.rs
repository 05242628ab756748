//! Prepared statement lifecycle.
//!
//! A [`Statement`] owns a stream to a MySQL server that has already
//! completed its handshake, and drives the binary-protocol command set
//! for one server-side statement at a time: prepare, bind, execute,
//! store, fetch, reset, close. Operations take `&mut self`, so two
//! commands can never be in flight on the same statement.
//!
//! Failures report through two channels, matching how database client
//! handles behave. Lifecycle misuse (executing before preparing,
//! seeking past the stored rows, an unknown attribute id) raises an
//! [`Error`]. Server refusals and lost connections instead make the
//! operation return `false` and record diagnostics that
//! [`Statement::error_code`], [`Statement::error_message`] and
//! [`Statement::sql_state`] read back.

// Row counts and payload lengths fit the protocol's 32-bit framing
#![allow(clippy::cast_possible_truncation)]

use std::io::{Read, Write};
use std::sync::Arc;

use crate::config::StatementConfig;
use crate::error::{Error, Result, ServerError};
use crate::protocol::{
    Channel, ErrPacket, ParamSlot, PrepareOk, WireReader, build_stmt_close_payload,
    build_stmt_execute_payload, build_stmt_fetch_payload, build_stmt_prepare_payload,
    build_stmt_reset_payload, build_stmt_send_long_data_payload, cr, parse_column_meta,
    server_status,
};
use crate::row::{ColumnInfo, Row};
use crate::types::{ColumnMeta, ResultMetadata};

mod attrs;
mod bind;
mod fetch;

pub use attrs::{
    AttrValue, CURSOR_TYPE_NO_CURSOR, CURSOR_TYPE_READ_ONLY, STMT_ATTR_CURSOR_TYPE,
    STMT_ATTR_PREFETCH_ROWS, STMT_ATTR_UPDATE_MAX_LENGTH,
};

use attrs::StmtAttrs;
use fetch::{column_value_lengths, decode_row};

/// Result rows buffered client-side by a store pass.
#[derive(Debug, Default)]
struct StoredRows {
    /// Raw binary row payloads in arrival order
    rows: Vec<Vec<u8>>,
    /// Next row index handed to a fetch
    position: u64,
}

/// A prepared statement over a post-handshake MySQL stream.
///
/// Dropping a statement that still holds a server-side handle sends a
/// best-effort COM_STMT_CLOSE. [`Statement::close`] remains the orderly
/// teardown path.
pub struct Statement<S: Read + Write> {
    /// Packet channel; `None` once the statement is closed
    channel: Option<Channel<S>>,
    /// Behavior knobs (capabilities, temporal convention)
    config: StatementConfig,
    /// Server-assigned statement id; zero while unprepared
    statement_id: u32,
    /// Placeholder count reported by prepare
    param_count: u16,
    /// Result-set metadata from prepare, replaced by execute
    columns: Vec<ColumnMeta>,
    /// Column names shared by every row of the current result
    column_info: Arc<ColumnInfo>,
    /// Bound parameter slots; `None` until a successful bind
    params: Option<Vec<ParamSlot>>,
    /// Placeholders fed through send_long_data since the last reset
    long_data: Vec<bool>,
    prepared: bool,
    executed: bool,
    /// Row packets from the last execute still unread on the stream
    pending_rows: bool,
    /// Server-side cursor open; rows come via COM_STMT_FETCH
    cursor_open: bool,
    stored: Option<StoredRows>,
    /// Affected-row count of the last execute; -1 when the statement
    /// produced a result set instead
    affected_rows: i64,
    last_insert_id: u64,
    warnings: u16,
    status_flags: u16,
    /// Diagnostics of the last failed round trip
    last_error: ServerError,
    attrs: StmtAttrs,
}

impl<S: Read + Write> std::fmt::Debug for Statement<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("statement_id", &self.statement_id)
            .field("prepared", &self.prepared)
            .field("param_count", &self.param_count)
            .field("field_count", &self.columns.len())
            .finish_non_exhaustive()
    }
}

/// How a row stream ended.
enum RowStreamEnd {
    /// Terminator packet with its status flags
    Done { warnings: u16, status_flags: u16 },
    /// Server aborted the stream with an ERR packet
    Aborted(ErrPacket),
    /// A packet that is neither row, terminator nor error
    Malformed,
}

impl<S: Read + Write> Statement<S> {
    /// Wraps a stream with default configuration.
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, StatementConfig::default())
    }

    /// Wraps a stream with explicit configuration. The capability flags
    /// must be the ones negotiated during the handshake on this stream.
    pub fn with_config(stream: S, config: StatementConfig) -> Self {
        let channel = Channel::new(stream, config.capabilities);
        Self {
            channel: Some(channel),
            config,
            statement_id: 0,
            param_count: 0,
            columns: Vec::new(),
            column_info: Arc::new(ColumnInfo::new(Vec::new())),
            params: None,
            long_data: Vec::new(),
            prepared: false,
            executed: false,
            pending_rows: false,
            cursor_open: false,
            stored: None,
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
            status_flags: 0,
            last_error: ServerError::default(),
            attrs: StmtAttrs::default(),
        }
    }

    /// Compiles `sql` into a server-side statement.
    ///
    /// Re-entrant: preparing again closes the previous server-side
    /// statement first. On failure the statement is left unprepared
    /// either way.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotInitialized`] after close. Server
    /// refusals return `Ok(false)` with diagnostics recorded.
    pub fn prepare(&mut self, sql: &str) -> Result<bool> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        let previous = self.statement_id;
        let drained = self.discard_pending();
        self.reset_statement_state();
        if let Err(e) = drained {
            return self.fail_lost(&e);
        }
        if previous != 0 {
            // Invalidate the old statement; COM_STMT_CLOSE has no response.
            if let Err(e) = self.send(&build_stmt_close_payload(previous)) {
                return self.fail_lost(&e);
            }
        }
        self.clear_error();

        if let Err(e) = self.send(&build_stmt_prepare_payload(sql)) {
            return self.fail_lost(&e);
        }
        let first = match self.recv() {
            Ok(payload) => payload,
            Err(e) => return self.fail_lost(&e),
        };
        match first.first() {
            Some(0x00) => {
                let Some(ok) = PrepareOk::parse(&first) else {
                    return self.fail(malformed_packet("prepare response"));
                };
                self.read_prepare_metadata(&ok)
            }
            Some(0xFF) => {
                let mut reader = WireReader::new(&first);
                match reader.parse_err_packet() {
                    Some(err) => self.fail_server(err),
                    None => self.fail(malformed_packet("prepare error packet")),
                }
            }
            _ => self.fail(malformed_packet("prepare response")),
        }
    }

    /// Runs the statement with the currently bound parameters.
    ///
    /// A previous unread result is drained and dropped first. When the
    /// statement produces a result set, its rows stay on the stream (or
    /// behind a server cursor) until [`Statement::store_result`] or
    /// [`Statement::fetch_all`] pulls them.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotPrepared`] before a successful prepare.
    /// Executing with placeholders but nothing bound records the
    /// classic no-data condition and returns `Ok(false)`, as do server
    /// refusals.
    pub fn execute(&mut self) -> Result<bool> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        if !self.prepared {
            return Err(Error::NotPrepared);
        }
        if self.param_count > 0 && self.params.is_none() {
            return self.fail(params_not_bound());
        }
        if let Err(e) = self.discard_pending() {
            return self.fail_lost(&e);
        }
        self.stored = None;
        self.cursor_open = false;
        self.executed = false;
        self.affected_rows = 0;
        self.last_insert_id = 0;
        self.clear_error();

        let slots = self.effective_slots();
        let payload =
            build_stmt_execute_payload(self.statement_id, self.attrs.cursor_type as u8, &slots);
        if let Err(e) = self.send(&payload) {
            return self.fail_lost(&e);
        }
        let first = match self.recv() {
            Ok(payload) => payload,
            Err(e) => return self.fail_lost(&e),
        };
        match first.first() {
            Some(0x00) => {
                let mut reader = WireReader::new(&first);
                let Some(ok) = reader.parse_ok_packet() else {
                    return self.fail(malformed_packet("execute response"));
                };
                // No result set. An affected count the protocol cannot
                // express stays at the unknown sentinel.
                self.affected_rows = i64::try_from(ok.affected_rows).unwrap_or(-1);
                self.last_insert_id = ok.last_insert_id;
                self.warnings = ok.warnings;
                self.status_flags = ok.status_flags;
                self.executed = true;
                Ok(true)
            }
            Some(0xFF) => {
                let mut reader = WireReader::new(&first);
                match reader.parse_err_packet() {
                    Some(err) => self.fail_server(err),
                    None => self.fail(malformed_packet("execute error packet")),
                }
            }
            Some(_) => self.read_execute_metadata(&first),
            None => self.fail(malformed_packet("execute response")),
        }
    }

    /// Materializes the whole result set client-side.
    ///
    /// Required before [`Statement::num_rows`] and
    /// [`Statement::data_seek`]. With a cursor open, rows are pulled in
    /// prefetch-sized batches; otherwise the pending stream is read to
    /// its terminator. With the update-max-length attribute set, each
    /// column's `max_length` is recomputed from the stored rows.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotPrepared`] before a successful prepare.
    /// Storing twice, or before execute, returns `Ok(false)` with an
    /// out-of-sync condition recorded, as does any server failure.
    pub fn store_result(&mut self) -> Result<bool> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        if !self.prepared {
            return Err(Error::NotPrepared);
        }
        if !self.executed || self.stored.is_some() {
            return self.fail(out_of_sync());
        }
        self.clear_error();
        if self.columns.is_empty() {
            // Statements without a result set store as zero rows.
            self.stored = Some(StoredRows::default());
            return Ok(true);
        }
        if !self.pending_rows && !self.cursor_open {
            return self.fail(out_of_sync());
        }

        let mut rows = Vec::new();
        if self.pending_rows {
            let end = match self.collect_rows(&mut rows) {
                Ok(end) => end,
                Err(e) => return self.fail_lost(&e),
            };
            self.pending_rows = false;
            match end {
                RowStreamEnd::Done {
                    warnings,
                    status_flags,
                } => {
                    self.warnings = warnings;
                    self.status_flags = status_flags;
                    // Under a deprecate-EOF channel the cursor announces
                    // itself here rather than after the metadata.
                    if status_flags & server_status::SERVER_STATUS_CURSOR_EXISTS != 0 {
                        self.cursor_open = true;
                    }
                }
                RowStreamEnd::Aborted(err) => return self.fail_server(err),
                RowStreamEnd::Malformed => return self.fail(malformed_packet("row stream")),
            }
        }
        if self.cursor_open {
            loop {
                let chunk = u32::try_from(self.attrs.prefetch_rows).unwrap_or(u32::MAX);
                let payload = build_stmt_fetch_payload(self.statement_id, chunk);
                if let Err(e) = self.send(&payload) {
                    return self.fail_lost(&e);
                }
                let end = match self.collect_rows(&mut rows) {
                    Ok(end) => end,
                    Err(e) => return self.fail_lost(&e),
                };
                match end {
                    RowStreamEnd::Done {
                        warnings,
                        status_flags,
                    } => {
                        self.warnings = warnings;
                        self.status_flags = status_flags;
                        if status_flags & server_status::SERVER_STATUS_LAST_ROW_SENT != 0 {
                            break;
                        }
                    }
                    RowStreamEnd::Aborted(err) => {
                        self.cursor_open = false;
                        return self.fail_server(err);
                    }
                    RowStreamEnd::Malformed => {
                        self.cursor_open = false;
                        return self.fail(malformed_packet("cursor fetch response"));
                    }
                }
            }
            self.cursor_open = false;
        }

        if self.attrs.update_max_length {
            self.recompute_max_lengths(&rows);
        }
        tracing::trace!(rows = rows.len(), "result set stored");
        self.stored = Some(StoredRows { rows, position: 0 });
        Ok(true)
    }

    /// Drops the stored result and drains any rows still on the stream.
    /// A no-op when nothing is stored.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotInitialized`] after [`Statement::close`].
    pub fn free_result(&mut self) -> Result<bool> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        self.stored = None;
        self.cursor_open = false;
        if let Err(e) = self.discard_pending() {
            return self.fail_lost(&e);
        }
        Ok(true)
    }

    /// Number of rows in the stored result.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoStoredResult`] until a store pass ran.
    pub fn num_rows(&self) -> Result<u64> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        match &self.stored {
            Some(stored) => Ok(stored.rows.len() as u64),
            None => Err(Error::NoStoredResult),
        }
    }

    /// Positions the row cursor inside the stored result. The next
    /// fetch starts at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoStoredResult`] until a store pass ran and
    /// with [`Error::InvalidRowOffset`] when `offset` is not below the
    /// stored row count.
    pub fn data_seek(&mut self, offset: u64) -> Result<()> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        let Some(stored) = &mut self.stored else {
            return Err(Error::NoStoredResult);
        };
        let rows = stored.rows.len() as u64;
        if offset >= rows {
            return Err(Error::InvalidRowOffset { offset, rows });
        }
        stored.position = offset;
        Ok(())
    }

    /// Marshals the result set into rows, from the current cursor
    /// position to the end.
    ///
    /// Returns `Ok(None)` when there is nothing to marshal: the
    /// statement produced no result set, or materializing it failed
    /// (diagnostics recorded). A result with zero rows returns an empty
    /// vector, not `None`. Stores the result implicitly when
    /// [`Statement::store_result`] has not run yet.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotPrepared`] before a successful prepare,
    /// with [`Error::TimeFieldsInvalid`] when a temporal column holds
    /// fields outside the civil calendar (zero dates included), and
    /// with [`Error::Server`] when a stored row payload does not parse.
    pub fn fetch_all(&mut self) -> Result<Option<Vec<Row>>> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        if !self.prepared {
            return Err(Error::NotPrepared);
        }
        if self.columns.is_empty() {
            return Ok(None);
        }
        if self.stored.is_none() && !self.store_result()? {
            return Ok(None);
        }

        let offset = self.config.temporal.offset_seconds();
        let column_info = Arc::clone(&self.column_info);
        let stored = self.stored.as_ref().ok_or(Error::NoStoredResult)?;
        let start = stored.position as usize;
        let mut out = Vec::with_capacity(stored.rows.len().saturating_sub(start));
        let mut malformed = false;
        for payload in &stored.rows[start..] {
            match decode_row(payload, &self.columns, offset)? {
                Some(values) => out.push(Row::with_columns(Arc::clone(&column_info), values)),
                None => {
                    malformed = true;
                    break;
                }
            }
        }
        if malformed {
            return Err(self.raise(malformed_packet("stored row")));
        }
        if let Some(stored) = &mut self.stored {
            stored.position = stored.rows.len() as u64;
        }
        Ok(Some(out))
    }

    /// Resets the server-side statement: open cursor and accumulated
    /// long data are discarded. Bound parameter slots and a stored
    /// result stay untouched client-side.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotPrepared`] before a successful prepare.
    /// Server refusals return `Ok(false)` with diagnostics recorded.
    pub fn reset(&mut self) -> Result<bool> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        if !self.prepared {
            return Err(Error::NotPrepared);
        }
        if let Err(e) = self.discard_pending() {
            return self.fail_lost(&e);
        }
        self.clear_error();
        if let Err(e) = self.send(&build_stmt_reset_payload(self.statement_id)) {
            return self.fail_lost(&e);
        }
        let first = match self.recv() {
            Ok(payload) => payload,
            Err(e) => return self.fail_lost(&e),
        };
        match first.first() {
            Some(0x00) => {
                let mut reader = WireReader::new(&first);
                let Some(ok) = reader.parse_ok_packet() else {
                    return self.fail(malformed_packet("reset response"));
                };
                self.warnings = ok.warnings;
                self.status_flags = ok.status_flags;
                for mark in &mut self.long_data {
                    *mark = false;
                }
                self.cursor_open = false;
                self.executed = false;
                Ok(true)
            }
            Some(0xFF) => {
                let mut reader = WireReader::new(&first);
                match reader.parse_err_packet() {
                    Some(err) => self.fail_server(err),
                    None => self.fail(malformed_packet("reset error packet")),
                }
            }
            _ => self.fail(malformed_packet("reset response")),
        }
    }

    /// Streams a chunk of one parameter's value ahead of execute.
    /// Chunks accumulate server-side until the next reset; the
    /// parameter's bound slot is ignored at execute. No response is
    /// read, so errors surface at execute time.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotPrepared`] before a successful prepare
    /// and with [`Error::InvalidParamIndex`] when the statement has no
    /// such placeholder.
    pub fn send_long_data(&mut self, param_index: u16, chunk: &[u8]) -> Result<bool> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        if !self.prepared {
            return Err(Error::NotPrepared);
        }
        if param_index >= self.param_count {
            return Err(Error::InvalidParamIndex {
                index: param_index,
                count: self.param_count,
            });
        }
        let payload = build_stmt_send_long_data_payload(self.statement_id, param_index, chunk);
        if let Err(e) = self.send(&payload) {
            return self.fail_lost(&e);
        }
        self.long_data[usize::from(param_index)] = true;
        Ok(true)
    }

    /// Closes the server-side statement and releases the channel.
    /// Idempotent; any other operation afterwards fails with
    /// [`Error::NotInitialized`]. Diagnostics survive the close.
    ///
    /// # Errors
    ///
    /// None currently; the signature leaves room for strict teardown.
    pub fn close(&mut self) -> Result<bool> {
        if self.channel.is_none() {
            return Ok(true);
        }
        // Best effort - ignore errors on close
        let _ = self.discard_pending();
        if self.statement_id != 0 {
            let _ = self.send(&build_stmt_close_payload(self.statement_id));
        }
        self.channel = None;
        self.reset_statement_state();
        Ok(true)
    }

    /// Closes the statement and hands the stream back, so the
    /// connection can keep serving other traffic.
    pub fn into_stream(mut self) -> Option<S> {
        let _ = self.discard_pending();
        if self.statement_id != 0 {
            let _ = self.send(&build_stmt_close_payload(self.statement_id));
        }
        self.channel.take().map(Channel::into_inner)
    }

    /// Reads one statement attribute.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnsupportedAttribute`] for an unknown id.
    pub fn attr_get(&self, attr: u32) -> Result<AttrValue> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        self.attrs.get(attr)
    }

    /// Sets one statement attribute. Cursor type takes effect at the
    /// next execute, prefetch size at the next cursor drain.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnsupportedAttribute`] for an unknown id and
    /// with [`Error::AttributeKind`] when the value kind does not match
    /// the attribute.
    pub fn attr_set(&mut self, attr: u32, value: AttrValue) -> Result<bool> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        self.attrs.set(attr, value)
    }

    /// Affected-row count of the last execute, -1 when the statement
    /// produced a result set instead.
    pub fn affected_rows(&self) -> i64 {
        self.affected_rows
    }

    /// Auto-increment id assigned by the last execute.
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    /// Warning count reported by the server for the last round trip.
    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// Number of columns the statement produces; zero for statements
    /// without a result set.
    pub fn field_count(&self) -> u32 {
        self.columns.len() as u32
    }

    /// Number of placeholders in the prepared statement.
    pub fn param_count(&self) -> u16 {
        self.param_count
    }

    /// Whether the statement currently holds a successful prepare.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Server-assigned statement id; zero while unprepared.
    pub fn statement_id(&self) -> u32 {
        self.statement_id
    }

    /// Metadata of the current result columns.
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Owned snapshot of the result-set metadata, or `None` when the
    /// statement produces no result set.
    pub fn result_metadata(&self) -> Option<ResultMetadata> {
        if self.columns.is_empty() {
            return None;
        }
        Some(ResultMetadata {
            field_count: self.columns.len() as u32,
            columns: self.columns.clone(),
        })
    }

    /// Error code of the last failed round trip, zero when clear.
    pub fn error_code(&self) -> u16 {
        self.last_error.code
    }

    /// Message of the last failed round trip, empty when clear.
    pub fn error_message(&self) -> &str {
        &self.last_error.message
    }

    /// SQLSTATE of the last failed round trip, `00000` when clear.
    pub fn sql_state(&self) -> &str {
        &self.last_error.sql_state
    }

    /// Reads prepare metadata: parameter definitions are counted and
    /// discarded (placeholders carry no useful typing), column
    /// definitions are kept.
    fn read_prepare_metadata(&mut self, ok: &PrepareOk) -> Result<bool> {
        for _ in 0..ok.num_params {
            if let Err(e) = self.recv() {
                return self.fail_lost(&e);
            }
        }
        if !self.deprecate_eof() && ok.num_params > 0 {
            if let Err(e) = self.recv() {
                return self.fail_lost(&e);
            }
        }
        let mut columns = Vec::with_capacity(usize::from(ok.num_columns));
        for read in 0..ok.num_columns {
            let payload = match self.recv() {
                Ok(payload) => payload,
                Err(e) => return self.fail_lost(&e),
            };
            let Some(meta) = parse_column_meta(&payload) else {
                return self.abandon_prepare(ok.statement_id, ok.num_columns - read - 1);
            };
            columns.push(meta);
        }
        if !self.deprecate_eof() && ok.num_columns > 0 {
            if let Err(e) = self.recv() {
                return self.fail_lost(&e);
            }
        }

        self.statement_id = ok.statement_id;
        self.param_count = ok.num_params;
        self.long_data = vec![false; usize::from(ok.num_params)];
        self.column_info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));
        self.columns = columns;
        self.warnings = ok.warnings;
        self.prepared = true;
        tracing::debug!(
            statement_id = ok.statement_id,
            params = ok.num_params,
            columns = ok.num_columns,
            "statement prepared"
        );
        Ok(true)
    }

    /// Resynchronizes after a bad definition packet mid-prepare: the
    /// remaining definitions are drained off the channel and the
    /// server-side statement, which no local state will ever point at,
    /// is closed before the failure is recorded.
    fn abandon_prepare(&mut self, statement_id: u32, remaining: u16) -> Result<bool> {
        for _ in 0..remaining {
            if let Err(e) = self.recv() {
                return self.fail_lost(&e);
            }
        }
        if !self.deprecate_eof() {
            if let Err(e) = self.recv() {
                return self.fail_lost(&e);
            }
        }
        if let Err(e) = self.send(&build_stmt_close_payload(statement_id)) {
            return self.fail_lost(&e);
        }
        self.fail(malformed_packet("column definition"))
    }

    /// Reads execute metadata for a result set: column count, column
    /// definitions, and the terminator framing the channel expects.
    fn read_execute_metadata(&mut self, first: &[u8]) -> Result<bool> {
        let mut reader = WireReader::new(first);
        let Some(count) = reader.read_lenenc_int() else {
            return self.fail(malformed_packet("column count"));
        };
        let mut columns = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let payload = match self.recv() {
                Ok(payload) => payload,
                Err(e) => return self.fail_lost(&e),
            };
            let Some(meta) = parse_column_meta(&payload) else {
                return self.fail(malformed_packet("column definition"));
            };
            columns.push(meta);
        }
        if self.deprecate_eof() {
            // Rows, or the cursor's terminator, follow directly; they
            // are read lazily by the next store pass.
            self.pending_rows = true;
        } else {
            let payload = match self.recv() {
                Ok(payload) => payload,
                Err(e) => return self.fail_lost(&e),
            };
            let mut reader = WireReader::new(&payload);
            let Some(eof) = reader.parse_eof_packet() else {
                return self.fail(malformed_packet("metadata terminator"));
            };
            self.warnings = eof.warnings;
            self.status_flags = eof.status_flags;
            self.cursor_open = eof.cursor_exists();
            self.pending_rows = !self.cursor_open;
        }

        self.column_info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));
        self.columns = columns;
        self.affected_rows = -1;
        self.executed = true;
        Ok(true)
    }

    /// The slots the next execute encodes: bound slots, with long-data
    /// placeholders riding the streamed value instead.
    fn effective_slots(&self) -> Vec<ParamSlot> {
        match &self.params {
            Some(bound) => bound
                .iter()
                .enumerate()
                .map(|(i, slot)| {
                    if self.long_data.get(i).copied().unwrap_or(false) {
                        ParamSlot::LongData
                    } else {
                        slot.clone()
                    }
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Reads row packets into `rows` until the stream terminates.
    fn collect_rows(&mut self, rows: &mut Vec<Vec<u8>>) -> std::io::Result<RowStreamEnd> {
        let deprecate = self.deprecate_eof();
        loop {
            let payload = self.recv()?;
            match payload.first() {
                Some(0x00) => rows.push(payload),
                Some(0xFF) => {
                    let mut reader = WireReader::new(&payload);
                    return Ok(match reader.parse_err_packet() {
                        Some(err) => RowStreamEnd::Aborted(err),
                        None => RowStreamEnd::Malformed,
                    });
                }
                Some(0xFE) => {
                    let mut reader = WireReader::new(&payload);
                    let end = if deprecate {
                        reader.parse_ok_packet().map(|ok| RowStreamEnd::Done {
                            warnings: ok.warnings,
                            status_flags: ok.status_flags,
                        })
                    } else {
                        reader.parse_eof_packet().map(|eof| RowStreamEnd::Done {
                            warnings: eof.warnings,
                            status_flags: eof.status_flags,
                        })
                    };
                    return Ok(end.unwrap_or(RowStreamEnd::Malformed));
                }
                _ => return Ok(RowStreamEnd::Malformed),
            }
        }
    }

    /// Drains and drops row packets left on the stream by a previous
    /// execute, so the next command finds the channel in sync.
    fn discard_pending(&mut self) -> std::io::Result<()> {
        if !self.pending_rows {
            return Ok(());
        }
        let mut sink = Vec::new();
        let _ = self.collect_rows(&mut sink)?;
        self.pending_rows = false;
        Ok(())
    }

    /// Recomputes per-column maximum value lengths from stored rows.
    fn recompute_max_lengths(&mut self, rows: &[Vec<u8>]) {
        for column in &mut self.columns {
            column.max_length = 0;
        }
        for payload in rows {
            let Some(lengths) = column_value_lengths(payload, &self.columns) else {
                continue;
            };
            for (column, len) in self.columns.iter_mut().zip(lengths) {
                column.max_length = column.max_length.max(len);
            }
        }
    }

    fn send(&mut self, payload: &[u8]) -> std::io::Result<()> {
        match self.channel.as_mut() {
            Some(channel) => channel.send_command(payload),
            None => Err(closed_stream()),
        }
    }

    fn recv(&mut self) -> std::io::Result<Vec<u8>> {
        match self.channel.as_mut() {
            Some(channel) => channel.read_packet(),
            None => Err(closed_stream()),
        }
    }

    fn deprecate_eof(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.deprecate_eof())
    }

    /// Records a failure and reports it through the false-and-record
    /// convention.
    fn fail(&mut self, error: ServerError) -> Result<bool> {
        self.last_error = error;
        Ok(false)
    }

    fn fail_server(&mut self, err: ErrPacket) -> Result<bool> {
        self.fail(ServerError::from_err_packet(err))
    }

    fn fail_lost(&mut self, err: &std::io::Error) -> Result<bool> {
        // The stream state is unknowable after an I/O failure.
        self.pending_rows = false;
        self.cursor_open = false;
        tracing::warn!(error = %err, "connection lost during statement round trip");
        self.fail(lost_connection(err))
    }

    /// Records a failure on a path that must raise instead of
    /// returning `false`.
    fn raise(&mut self, error: ServerError) -> Error {
        self.last_error = error.clone();
        Error::Server(error)
    }

    fn clear_error(&mut self) {
        self.last_error = ServerError::default();
    }

    /// Returns local state to its pre-prepare shape. Diagnostics are
    /// kept so they stay readable after a failure.
    fn reset_statement_state(&mut self) {
        self.statement_id = 0;
        self.param_count = 0;
        self.columns.clear();
        self.column_info = Arc::new(ColumnInfo::new(Vec::new()));
        self.params = None;
        self.long_data.clear();
        self.prepared = false;
        self.executed = false;
        self.pending_rows = false;
        self.cursor_open = false;
        self.stored = None;
        self.affected_rows = 0;
        self.last_insert_id = 0;
        self.warnings = 0;
        self.status_flags = 0;
    }
}

impl<S: Read + Write> Drop for Statement<S> {
    fn drop(&mut self) {
        if self.statement_id != 0 && self.channel.is_some() {
            // Best effort - ignore errors on close
            let _ = self.send(&build_stmt_close_payload(self.statement_id));
        }
    }
}

// Helper functions for the recorded client-side conditions; messages
// follow the classic client library wording.

fn lost_connection(err: &std::io::Error) -> ServerError {
    ServerError::client(
        cr::CR_SERVER_LOST,
        format!("Lost connection to MySQL server during query: {err}"),
    )
}

fn malformed_packet(what: &str) -> ServerError {
    ServerError::client(cr::CR_MALFORMED_PACKET, format!("Malformed packet: {what}"))
}

fn out_of_sync() -> ServerError {
    ServerError::client(
        cr::CR_COMMANDS_OUT_OF_SYNC,
        "Commands out of sync; you can't run this command now",
    )
}

fn params_not_bound() -> ServerError {
    ServerError::client(
        cr::CR_PARAMS_NOT_BOUND,
        "No data supplied for parameters in prepared statement",
    )
}

fn closed_stream() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "statement channel closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    /// Stream that is empty on read and swallows writes.
    struct NullStream;

    impl Read for NullStream {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for NullStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lifecycle_guards_before_prepare() {
        let mut stmt = Statement::new(NullStream);
        assert!(matches!(stmt.execute(), Err(Error::NotPrepared)));
        assert!(matches!(stmt.bind_params(&[]), Err(Error::NotPrepared)));
        assert!(matches!(stmt.fetch_all(), Err(Error::NotPrepared)));
        assert!(matches!(stmt.reset(), Err(Error::NotPrepared)));
        assert!(matches!(stmt.store_result(), Err(Error::NotPrepared)));
        assert!(matches!(
            stmt.send_long_data(0, b"x"),
            Err(Error::NotPrepared)
        ));
        // Freeing with nothing stored is a no-op, not a misuse.
        assert!(stmt.free_result().unwrap());
    }

    #[test]
    fn row_accessors_require_a_stored_result() {
        let mut stmt = Statement::new(NullStream);
        assert!(matches!(stmt.num_rows(), Err(Error::NoStoredResult)));
        assert!(matches!(stmt.data_seek(0), Err(Error::NoStoredResult)));
    }

    #[test]
    fn close_is_idempotent_then_uninitialized() {
        let mut stmt = Statement::new(NullStream);
        assert!(stmt.close().unwrap());
        assert!(stmt.close().unwrap());
        assert!(matches!(stmt.prepare("SELECT 1"), Err(Error::NotInitialized)));
        assert!(matches!(stmt.execute(), Err(Error::NotInitialized)));
        assert!(matches!(
            stmt.bind_params(&[Value::Null]),
            Err(Error::NotInitialized)
        ));
        assert!(matches!(stmt.fetch_all(), Err(Error::NotInitialized)));
        assert!(matches!(stmt.num_rows(), Err(Error::NotInitialized)));
        assert!(matches!(
            stmt.attr_get(STMT_ATTR_CURSOR_TYPE),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn fresh_statement_has_clear_diagnostics() {
        let stmt = Statement::new(NullStream);
        assert_eq!(stmt.error_code(), 0);
        assert_eq!(stmt.error_message(), "");
        assert_eq!(stmt.sql_state(), "00000");
        assert_eq!(stmt.affected_rows(), 0);
        assert_eq!(stmt.last_insert_id(), 0);
        assert_eq!(stmt.field_count(), 0);
        assert_eq!(stmt.param_count(), 0);
        assert!(!stmt.is_prepared());
        assert!(stmt.result_metadata().is_none());
    }

    #[test]
    fn attrs_reachable_through_statement() {
        let mut stmt = Statement::new(NullStream);
        assert!(
            stmt.attr_set(STMT_ATTR_PREFETCH_ROWS, AttrValue::Uint(16))
                .unwrap()
        );
        assert_eq!(
            stmt.attr_get(STMT_ATTR_PREFETCH_ROWS).unwrap(),
            AttrValue::Uint(16)
        );
        assert!(matches!(
            stmt.attr_get(42),
            Err(Error::UnsupportedAttribute { attr: 42 })
        ));
    }

    #[test]
    fn prepare_over_dead_stream_records_lost_connection() {
        let mut stmt = Statement::new(NullStream);
        assert!(!stmt.prepare("SELECT 1").unwrap());
        assert_eq!(stmt.error_code(), cr::CR_SERVER_LOST);
        assert_eq!(stmt.sql_state(), cr::SQLSTATE_CLIENT);
        assert!(!stmt.is_prepared());
    }
}

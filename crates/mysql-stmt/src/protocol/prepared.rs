//! Prepared-statement command payloads and response fragments.
//!
//! Builders for the statement subset of the command protocol
//! (COM_STMT_PREPARE, COM_STMT_EXECUTE, COM_STMT_SEND_LONG_DATA,
//! COM_STMT_CLOSE, COM_STMT_RESET, COM_STMT_FETCH) plus parsers for the
//! prepare response and column definitions. All builders return bare
//! payloads; the channel adds packet framing.
//!
//! # Protocol Flow
//!
//! 1. **Prepare**: COM_STMT_PREPARE with the SQL text.
//!    - Server returns statement ID, param count, column count.
//!    - Then one column definition per parameter and per result column.
//! 2. **Execute**: COM_STMT_EXECUTE with statement ID + binary params.
//!    - Server returns OK, ERR, or a binary result set.
//! 3. **Close**: COM_STMT_CLOSE with the statement ID. No response.
//!
//! # References
//!
//! - [COM_STMT_PREPARE](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_prepare.html)
//! - [COM_STMT_EXECUTE](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_execute.html)
//! - [Binary Protocol Value](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_binary_resultset.html)

#![allow(clippy::cast_possible_truncation)]

use super::{Command, WireReader, WireWriter};
use crate::temporal::WireDateTime;
use crate::types::{ColumnMeta, WireType};

/// Response from COM_STMT_PREPARE.
#[derive(Debug, Clone)]
pub struct PrepareOk {
    /// Server-assigned statement identifier (used in execute/close)
    pub statement_id: u32,
    /// Number of columns in the result set (0 for non-SELECT)
    pub num_columns: u16,
    /// Number of `?` placeholders in the SQL
    pub num_params: u16,
    /// Number of warnings generated during prepare
    pub warnings: u16,
}

impl PrepareOk {
    /// Parse a COM_STMT_PREPARE_OK payload.
    ///
    /// # Format
    ///
    /// - Status: 0x00 (1 byte)
    /// - Statement ID (4 bytes)
    /// - Number of columns (2 bytes)
    /// - Number of parameters (2 bytes)
    /// - Reserved: 0x00 (1 byte)
    /// - Warning count (2 bytes)
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 12 || data[0] != 0x00 {
            return None;
        }
        let statement_id = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
        let num_columns = u16::from_le_bytes([data[5], data[6]]);
        let num_params = u16::from_le_bytes([data[7], data[8]]);
        // data[9] is reserved
        let warnings = u16::from_le_bytes([data[10], data[11]]);
        Some(Self {
            statement_id,
            num_columns,
            num_params,
            warnings,
        })
    }
}

/// One binding slot of an execute packet, already carrying its wire
/// representation. The inference from caller values to slots happens in
/// the statement layer; this type only knows how each shape goes on the
/// wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSlot {
    /// SQL NULL; occupies a bit in the NULL bitmap, no value bytes
    Null,
    /// One-byte integer (booleans travel this way)
    Tiny { value: u8 },
    /// Signed 32-bit integer
    Int { value: i32 },
    /// Unsigned 32-bit integer (type byte LONG with the unsigned flag)
    Uint { value: u32 },
    /// Double-precision float
    Double { value: f64 },
    /// Length-encoded byte string
    Text { bytes: Vec<u8> },
    /// Calendar value in DATETIME layout
    DateTime { value: WireDateTime },
    /// Value streamed earlier via COM_STMT_SEND_LONG_DATA; the type byte
    /// still goes out but no value bytes follow
    LongData,
}

impl ParamSlot {
    /// Type byte sent in the execute packet.
    #[must_use]
    pub const fn wire_type(&self) -> WireType {
        match self {
            ParamSlot::Null => WireType::Null,
            ParamSlot::Tiny { .. } => WireType::Tiny,
            ParamSlot::Int { .. } | ParamSlot::Uint { .. } => WireType::Long,
            ParamSlot::Double { .. } => WireType::Double,
            ParamSlot::Text { .. } => WireType::String,
            ParamSlot::DateTime { .. } => WireType::DateTime,
            ParamSlot::LongData => WireType::Blob,
        }
    }

    /// Whether the type byte carries the unsigned flag (0x80).
    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        matches!(self, ParamSlot::Uint { .. })
    }

    /// Whether the slot sets its bit in the NULL bitmap.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, ParamSlot::Null)
    }

    fn encode_value(&self, writer: &mut WireWriter) {
        match self {
            // NULL rides the bitmap; long data was already streamed
            ParamSlot::Null | ParamSlot::LongData => {}
            ParamSlot::Tiny { value } => writer.write_u8(*value),
            ParamSlot::Int { value } => writer.write_u32_le(*value as u32),
            ParamSlot::Uint { value } => writer.write_u32_le(*value),
            ParamSlot::Double { value } => writer.write_f64_le(*value),
            ParamSlot::Text { bytes } => writer.write_lenenc_bytes(bytes),
            ParamSlot::DateTime { value } => encode_datetime(writer, value),
        }
    }
}

/// Build a COM_STMT_PREPARE payload.
#[must_use]
pub fn build_stmt_prepare_payload(sql: &str) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(1 + sql.len());
    writer.write_u8(Command::StmtPrepare as u8);
    writer.write_bytes(sql.as_bytes());
    writer.into_bytes()
}

/// Build a COM_STMT_EXECUTE payload.
///
/// # Format
///
/// - Command byte (0x17)
/// - Statement ID (4 bytes, little-endian)
/// - Flags (1 byte): cursor type
/// - Iteration count (4 bytes, always 1)
/// - If there are parameters:
///   - NULL bitmap, `(num_params + 7) / 8` bytes
///   - New-params-bound flag (1 byte, always 1: types are re-sent on
///     every execute)
///   - Per parameter: type byte + flag byte (0x80 = unsigned)
///   - Value bytes for every slot that is neither NULL nor long data
#[must_use]
pub fn build_stmt_execute_payload(statement_id: u32, cursor_type: u8, params: &[ParamSlot]) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(16 + params.len() * 16);

    writer.write_u8(Command::StmtExecute as u8);
    writer.write_u32_le(statement_id);
    writer.write_u8(cursor_type);
    writer.write_u32_le(1);

    if !params.is_empty() {
        let mut null_bitmap = vec![0u8; params.len().div_ceil(8)];
        for (i, param) in params.iter().enumerate() {
            if param.is_null() {
                null_bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        writer.write_bytes(&null_bitmap);

        writer.write_u8(1);

        for param in params {
            writer.write_u8(param.wire_type() as u8);
            writer.write_u8(if param.is_unsigned() { 0x80 } else { 0x00 });
        }

        for param in params {
            param.encode_value(&mut writer);
        }
    }

    writer.into_bytes()
}

/// Build a COM_STMT_SEND_LONG_DATA payload. The chunk bytes follow the
/// header raw, without a length encoding; the packet boundary delimits
/// them. The server never responds to this command.
#[must_use]
pub fn build_stmt_send_long_data_payload(statement_id: u32, param_index: u16, chunk: &[u8]) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(7 + chunk.len());
    writer.write_u8(Command::StmtSendLongData as u8);
    writer.write_u32_le(statement_id);
    writer.write_u16_le(param_index);
    writer.write_bytes(chunk);
    writer.into_bytes()
}

/// Build a COM_STMT_CLOSE payload. The server never responds.
#[must_use]
pub fn build_stmt_close_payload(statement_id: u32) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(5);
    writer.write_u8(Command::StmtClose as u8);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}

/// Build a COM_STMT_RESET payload. Discards long data accumulated with
/// COM_STMT_SEND_LONG_DATA and closes any open server-side cursor.
#[must_use]
pub fn build_stmt_reset_payload(statement_id: u32) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(5);
    writer.write_u8(Command::StmtReset as u8);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}

/// Build a COM_STMT_FETCH payload requesting `num_rows` rows from an
/// open cursor.
#[must_use]
pub fn build_stmt_fetch_payload(statement_id: u32, num_rows: u32) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(9);
    writer.write_u8(Command::StmtFetch as u8);
    writer.write_u32_le(statement_id);
    writer.write_u32_le(num_rows);
    writer.into_bytes()
}

/// Parse a column definition payload (protocol 4.1 layout).
///
/// Catalog, schema, and the original names are skipped; only the fields
/// the statement layer consumes are kept.
#[must_use]
pub fn parse_column_meta(payload: &[u8]) -> Option<ColumnMeta> {
    let mut reader = WireReader::new(payload);
    reader.read_lenenc_bytes()?; // catalog, always "def"
    reader.read_lenenc_bytes()?; // schema
    let table = reader.read_lenenc_string()?;
    reader.read_lenenc_bytes()?; // org_table
    let name = reader.read_lenenc_string()?;
    reader.read_lenenc_bytes()?; // org_name
    reader.read_lenenc_int()?; // length of fixed fields, always 0x0c
    let charset = reader.read_u16_le()?;
    let column_length = reader.read_u32_le()?;
    let wire_type = WireType::from_u8(reader.read_u8()?);
    let flags = reader.read_u16_le()?;
    let decimals = reader.read_u8()?;
    Some(ColumnMeta {
        table,
        name,
        charset,
        column_length,
        wire_type,
        flags,
        decimals,
        max_length: 0,
    })
}

/// Encode a calendar value in the DATETIME binary layout, choosing the
/// shortest of the 0, 4, 7, and 11 byte forms.
pub fn encode_datetime(writer: &mut WireWriter, dt: &WireDateTime) {
    let date_zero = dt.year == 0 && dt.month == 0 && dt.day == 0;
    let time_zero = dt.hour == 0 && dt.minute == 0 && dt.second == 0;
    if date_zero && time_zero && dt.micros == 0 {
        writer.write_u8(0);
    } else if time_zero && dt.micros == 0 {
        writer.write_u8(4);
        writer.write_u16_le(dt.year);
        writer.write_u8(dt.month);
        writer.write_u8(dt.day);
    } else if dt.micros == 0 {
        writer.write_u8(7);
        writer.write_u16_le(dt.year);
        writer.write_u8(dt.month);
        writer.write_u8(dt.day);
        writer.write_u8(dt.hour as u8);
        writer.write_u8(dt.minute);
        writer.write_u8(dt.second);
    } else {
        writer.write_u8(11);
        writer.write_u16_le(dt.year);
        writer.write_u8(dt.month);
        writer.write_u8(dt.day);
        writer.write_u8(dt.hour as u8);
        writer.write_u8(dt.minute);
        writer.write_u8(dt.second);
        writer.write_u32_le(dt.micros);
    }
}

/// Decode a DATE/DATETIME/TIMESTAMP binary value (length-prefixed
/// 0, 4, 7, or 11 byte layout).
#[must_use]
pub fn decode_datetime(reader: &mut WireReader<'_>) -> Option<WireDateTime> {
    let len = reader.read_u8()?;
    let mut dt = WireDateTime::default();
    if len >= 4 {
        dt.year = reader.read_u16_le()?;
        dt.month = reader.read_u8()?;
        dt.day = reader.read_u8()?;
    }
    if len >= 7 {
        dt.hour = u16::from(reader.read_u8()?);
        dt.minute = reader.read_u8()?;
        dt.second = reader.read_u8()?;
    }
    if len >= 11 {
        dt.micros = reader.read_u32_le()?;
    }
    Some(dt)
}

/// Decode a TIME binary value (length-prefixed 0, 8, or 12 byte
/// layout). The day count folds into the hour field, matching how the
/// client library surfaces durations.
#[must_use]
pub fn decode_time(reader: &mut WireReader<'_>) -> Option<WireDateTime> {
    let len = reader.read_u8()?;
    let mut dt = WireDateTime::default();
    if len >= 8 {
        dt.negative = reader.read_u8()? != 0;
        let days = reader.read_u32_le()?;
        let hours = u16::from(reader.read_u8()?);
        dt.hour = (days as u16).saturating_mul(24).saturating_add(hours);
        dt.minute = reader.read_u8()?;
        dt.second = reader.read_u8()?;
    }
    if len >= 12 {
        dt.micros = reader.read_u32_le()?;
    }
    Some(dt)
}

//! MySQL wire protocol plumbing for the prepared-statement subset.
//!
//! Every MySQL packet carries a 4-byte header:
//! - 3 bytes: payload length (little-endian)
//! - 1 byte: sequence number
//!
//! Maximum payload per packet is 2^24 - 1; larger payloads are split and
//! the receiver reassembles continuation packets. This crate only speaks
//! the statement half of the command set (COM_STMT_*); the handshake and
//! text protocol belong to the connection layer that hands us the stream.

pub mod channel;
pub mod prepared;
pub mod reader;
pub mod writer;

pub use channel::Channel;
pub use prepared::{
    ParamSlot, PrepareOk, build_stmt_close_payload, build_stmt_execute_payload,
    build_stmt_fetch_payload, build_stmt_prepare_payload, build_stmt_reset_payload,
    build_stmt_send_long_data_payload, decode_datetime, decode_time, parse_column_meta,
};
pub use reader::WireReader;
pub use writer::WireWriter;

/// Maximum payload size for a single MySQL packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// Capability flags relevant to statement traffic.
///
/// The full bitmask is negotiated during the handshake (out of scope
/// here); the statement layer receives the negotiated value through its
/// configuration and only consults the bits below.
pub mod capabilities {
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_PS_MULTI_RESULTS: u32 = 1 << 18;
    /// EOF packets between metadata and rows are dropped; result sets are
    /// terminated by an OK packet with a 0xFE header instead.
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Capabilities assumed when the caller does not supply the
    /// negotiated set (matches what modern servers grant).
    pub const DEFAULT_STMT_FLAGS: u32 = CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_PS_MULTI_RESULTS
        | CLIENT_DEPRECATE_EOF;
}

/// Statement command codes (COM_STMT_xxx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Compile a query into a server-side statement
    StmtPrepare = 0x16,
    /// Execute a prepared statement with bound parameters
    StmtExecute = 0x17,
    /// Stream a parameter value ahead of execute (no response)
    StmtSendLongData = 0x18,
    /// Discard a server-side statement (no response)
    StmtClose = 0x19,
    /// Reset statement state, discarding accumulated long data
    StmtReset = 0x1a,
    /// Fetch rows from an open cursor
    StmtFetch = 0x1c,
}

/// Server status flags carried by OK/EOF packets.
pub mod server_status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
    /// Execute opened a cursor; rows must be pulled with COM_STMT_FETCH.
    pub const SERVER_STATUS_CURSOR_EXISTS: u16 = 0x0040;
    /// A cursor fetch returned the final row.
    pub const SERVER_STATUS_LAST_ROW_SENT: u16 = 0x0080;
}

/// Client-side error codes (CR_xxx), reported when a failure is detected
/// before the server says anything. Numbering follows the classic client
/// library so diagnostics stay greppable.
pub mod cr {
    pub const CR_UNKNOWN_ERROR: u16 = 2000;
    pub const CR_SERVER_LOST: u16 = 2013;
    pub const CR_COMMANDS_OUT_OF_SYNC: u16 = 2014;
    pub const CR_MALFORMED_PACKET: u16 = 2027;
    pub const CR_PARAMS_NOT_BOUND: u16 = 2031;
    pub const CR_INVALID_PARAMETER_NO: u16 = 2034;
    pub const CR_NO_RESULT_SET: u16 = 2053;

    /// SQL state used for every client-detected failure.
    pub const SQLSTATE_CLIENT: &str = "HY000";
}

/// A MySQL packet header.
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    /// Payload length (3 bytes, max 16MB - 1)
    pub payload_length: u32,
    /// Sequence number (wraps at 255)
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Total header size in bytes.
    pub const SIZE: usize = 4;

    /// Parse a packet header from 4 bytes.
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        let payload_length =
            u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16);
        let sequence_id = bytes[3];
        Self {
            payload_length,
            sequence_id,
        }
    }

    /// Encode the header to 4 bytes.
    pub fn to_bytes(&self) -> [u8; 4] {
        [
            (self.payload_length & 0xFF) as u8,
            ((self.payload_length >> 8) & 0xFF) as u8,
            ((self.payload_length >> 16) & 0xFF) as u8,
            self.sequence_id,
        ]
    }
}

/// Classification of a server response packet.
///
/// Only valid outside the row phase of a result set: binary row packets
/// begin with a 0x00 byte and would be misread as OK. Row phases dispatch
/// on the first byte directly (0xFE terminator, 0xFF error, anything else
/// a row).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// OK packet (0x00)
    Ok,
    /// Error packet (0xFF)
    Error,
    /// EOF packet (0xFE with payload < 9 bytes)
    Eof,
    /// Anything else (column count, column definition, ...)
    Data,
}

impl ResponseType {
    /// Detect the response type from the first payload byte.
    pub fn from_first_byte(byte: u8, payload_len: u32) -> Self {
        match byte {
            0x00 => ResponseType::Ok,
            0xFF => ResponseType::Error,
            0xFE if payload_len < 9 => ResponseType::Eof,
            _ => ResponseType::Data,
        }
    }
}

/// Parsed OK packet.
#[derive(Debug, Clone)]
pub struct OkPacket {
    /// Number of affected rows
    pub affected_rows: u64,
    /// Last insert ID
    pub last_insert_id: u64,
    /// Server status flags
    pub status_flags: u16,
    /// Number of warnings
    pub warnings: u16,
    /// Info string (if any)
    pub info: String,
}

impl OkPacket {
    /// True when the server left a cursor open for this statement.
    pub fn cursor_exists(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_CURSOR_EXISTS != 0
    }

    /// True when a cursor fetch delivered the final row.
    pub fn last_row_sent(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_LAST_ROW_SENT != 0
    }
}

/// Parsed Error packet.
#[derive(Debug, Clone)]
pub struct ErrPacket {
    /// Error code
    pub error_code: u16,
    /// SQL state (5 characters)
    pub sql_state: String,
    /// Error message
    pub error_message: String,
}

/// Parsed EOF packet (absent when CLIENT_DEPRECATE_EOF is negotiated).
#[derive(Debug, Clone, Copy)]
pub struct EofPacket {
    /// Number of warnings
    pub warnings: u16,
    /// Server status flags
    pub status_flags: u16,
}

impl EofPacket {
    /// True when the server left a cursor open for this statement.
    pub fn cursor_exists(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_CURSOR_EXISTS != 0
    }

    /// True when a cursor fetch delivered the final row.
    pub fn last_row_sent(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_LAST_ROW_SENT != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_header_roundtrip() {
        let header = PacketHeader {
            payload_length: 0x0012_3456,
            sequence_id: 7,
        };
        let bytes = header.to_bytes();
        let parsed = PacketHeader::from_bytes(&bytes);
        assert_eq!(header.payload_length, parsed.payload_length);
        assert_eq!(header.sequence_id, parsed.sequence_id);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn packet_header_max_size() {
        let header = PacketHeader {
            payload_length: MAX_PACKET_SIZE as u32,
            sequence_id: 255,
        };
        assert_eq!(header.to_bytes(), [0xFF, 0xFF, 0xFF, 255]);
    }

    #[test]
    fn response_type_detection() {
        assert_eq!(ResponseType::from_first_byte(0x00, 10), ResponseType::Ok);
        assert_eq!(ResponseType::from_first_byte(0xFF, 10), ResponseType::Error);
        assert_eq!(ResponseType::from_first_byte(0xFE, 5), ResponseType::Eof);
        assert_eq!(ResponseType::from_first_byte(0xFE, 100), ResponseType::Data);
        assert_eq!(ResponseType::from_first_byte(0x05, 10), ResponseType::Data);
    }

    #[test]
    fn command_codes_match_wire_values() {
        assert_eq!(Command::StmtPrepare as u8, 0x16);
        assert_eq!(Command::StmtExecute as u8, 0x17);
        assert_eq!(Command::StmtSendLongData as u8, 0x18);
        assert_eq!(Command::StmtClose as u8, 0x19);
        assert_eq!(Command::StmtReset as u8, 0x1a);
        assert_eq!(Command::StmtFetch as u8, 0x1c);
    }

    #[test]
    fn ok_packet_cursor_flags() {
        let ok = OkPacket {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: server_status::SERVER_STATUS_CURSOR_EXISTS,
            warnings: 0,
            info: String::new(),
        };
        assert!(ok.cursor_exists());
        assert!(!ok.last_row_sent());
    }
}

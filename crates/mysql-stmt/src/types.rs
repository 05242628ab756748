//! Wire type codes and column metadata.
//!
//! The protocol tags every parameter and column with a type byte (the
//! `MYSQL_TYPE_*` constants). The statement layer never works with the
//! raw byte: it groups types into the families that decide slot shape
//! (integer, tiny, float, decimal, temporal, string) and carries
//! per-column metadata alongside. Tiny is kept apart from the integer
//! family so boolean semantics survive the round trip.

/// Protocol type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// DECIMAL (MYSQL_TYPE_DECIMAL)
    Decimal = 0x00,
    /// TINYINT (MYSQL_TYPE_TINY)
    Tiny = 0x01,
    /// SMALLINT (MYSQL_TYPE_SHORT)
    Short = 0x02,
    /// INT (MYSQL_TYPE_LONG)
    Long = 0x03,
    /// FLOAT (MYSQL_TYPE_FLOAT)
    Float = 0x04,
    /// DOUBLE (MYSQL_TYPE_DOUBLE)
    Double = 0x05,
    /// NULL (MYSQL_TYPE_NULL)
    Null = 0x06,
    /// TIMESTAMP (MYSQL_TYPE_TIMESTAMP)
    Timestamp = 0x07,
    /// BIGINT (MYSQL_TYPE_LONGLONG)
    LongLong = 0x08,
    /// MEDIUMINT (MYSQL_TYPE_INT24)
    Int24 = 0x09,
    /// DATE (MYSQL_TYPE_DATE)
    Date = 0x0A,
    /// TIME (MYSQL_TYPE_TIME)
    Time = 0x0B,
    /// DATETIME (MYSQL_TYPE_DATETIME)
    DateTime = 0x0C,
    /// YEAR (MYSQL_TYPE_YEAR)
    Year = 0x0D,
    /// NEWDATE (MYSQL_TYPE_NEWDATE) - internal use
    NewDate = 0x0E,
    /// VARCHAR (MYSQL_TYPE_VARCHAR)
    VarChar = 0x0F,
    /// BIT (MYSQL_TYPE_BIT)
    Bit = 0x10,
    /// JSON (MYSQL_TYPE_JSON)
    Json = 0xF5,
    /// NEWDECIMAL (MYSQL_TYPE_NEWDECIMAL)
    NewDecimal = 0xF6,
    /// ENUM (MYSQL_TYPE_ENUM)
    Enum = 0xF7,
    /// SET (MYSQL_TYPE_SET)
    Set = 0xF8,
    /// TINYBLOB (MYSQL_TYPE_TINY_BLOB)
    TinyBlob = 0xF9,
    /// MEDIUMBLOB (MYSQL_TYPE_MEDIUM_BLOB)
    MediumBlob = 0xFA,
    /// LONGBLOB (MYSQL_TYPE_LONG_BLOB)
    LongBlob = 0xFB,
    /// BLOB (MYSQL_TYPE_BLOB)
    Blob = 0xFC,
    /// VARCHAR (MYSQL_TYPE_VAR_STRING)
    VarString = 0xFD,
    /// CHAR (MYSQL_TYPE_STRING)
    String = 0xFE,
    /// GEOMETRY (MYSQL_TYPE_GEOMETRY)
    Geometry = 0xFF,
}

impl WireType {
    /// Parse a type code. Unknown codes fall back to `String`, the
    /// widest family.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => WireType::Decimal,
            0x01 => WireType::Tiny,
            0x02 => WireType::Short,
            0x03 => WireType::Long,
            0x04 => WireType::Float,
            0x05 => WireType::Double,
            0x06 => WireType::Null,
            0x07 => WireType::Timestamp,
            0x08 => WireType::LongLong,
            0x09 => WireType::Int24,
            0x0A => WireType::Date,
            0x0B => WireType::Time,
            0x0C => WireType::DateTime,
            0x0D => WireType::Year,
            0x0E => WireType::NewDate,
            0x0F => WireType::VarChar,
            0x10 => WireType::Bit,
            0xF5 => WireType::Json,
            0xF6 => WireType::NewDecimal,
            0xF7 => WireType::Enum,
            0xF8 => WireType::Set,
            0xF9 => WireType::TinyBlob,
            0xFA => WireType::MediumBlob,
            0xFB => WireType::LongBlob,
            0xFC => WireType::Blob,
            0xFD => WireType::VarString,
            0xFE => WireType::String,
            0xFF => WireType::Geometry,
            other => {
                tracing::warn!(code = other, "unknown wire type, treating as string");
                WireType::String
            }
        }
    }

    /// Integer family sharing one int-sized slot. NULL rides along: the
    /// bitmap carries the actual nullness and a NULL-typed column has no
    /// value bytes.
    #[must_use]
    pub const fn is_int_family(self) -> bool {
        matches!(
            self,
            WireType::Null | WireType::Short | WireType::Long | WireType::LongLong | WireType::Int24
        )
    }

    /// Floating-point family sharing the double-sized slot.
    #[must_use]
    pub const fn is_float_family(self) -> bool {
        matches!(self, WireType::Float | WireType::Double)
    }

    /// Decimal family, marshalled as text to preserve precision.
    #[must_use]
    pub const fn is_decimal(self) -> bool {
        matches!(self, WireType::Decimal | WireType::NewDecimal)
    }

    /// Temporal family, marshalled through calendar fields.
    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            WireType::Timestamp
                | WireType::Date
                | WireType::Time
                | WireType::DateTime
                | WireType::Year
                | WireType::NewDate
        )
    }

    /// Everything not claimed by another family decodes through the
    /// byte-buffer slot: chars, varchars, blobs, enums, sets, JSON, BIT,
    /// geometry.
    #[must_use]
    pub const fn is_string_family(self) -> bool {
        !(self.is_int_family()
            || self.is_float_family()
            || self.is_decimal()
            || self.is_temporal()
            || matches!(self, WireType::Tiny))
    }

    /// Human-readable name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            WireType::Decimal | WireType::NewDecimal => "DECIMAL",
            WireType::Tiny => "TINYINT",
            WireType::Short => "SMALLINT",
            WireType::Long => "INT",
            WireType::Float => "FLOAT",
            WireType::Double => "DOUBLE",
            WireType::Null => "NULL",
            WireType::Timestamp => "TIMESTAMP",
            WireType::LongLong => "BIGINT",
            WireType::Int24 => "MEDIUMINT",
            WireType::Date | WireType::NewDate => "DATE",
            WireType::Time => "TIME",
            WireType::DateTime => "DATETIME",
            WireType::Year => "YEAR",
            WireType::VarChar | WireType::VarString => "VARCHAR",
            WireType::Bit => "BIT",
            WireType::Json => "JSON",
            WireType::Enum => "ENUM",
            WireType::Set => "SET",
            WireType::TinyBlob => "TINYBLOB",
            WireType::MediumBlob => "MEDIUMBLOB",
            WireType::LongBlob => "LONGBLOB",
            WireType::Blob => "BLOB",
            WireType::String => "CHAR",
            WireType::Geometry => "GEOMETRY",
        }
    }
}

/// Column flags in result-set metadata.
pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNIQUE_KEY: u16 = 4;
    pub const MULTIPLE_KEY: u16 = 8;
    pub const BLOB: u16 = 16;
    pub const UNSIGNED: u16 = 32;
    pub const ZEROFILL: u16 = 64;
    pub const BINARY: u16 = 128;
    pub const ENUM: u16 = 256;
    pub const AUTO_INCREMENT: u16 = 512;
    pub const TIMESTAMP: u16 = 1024;
    pub const SET: u16 = 2048;
    pub const NUM: u16 = 32768;
}

/// Metadata for one result-set column (or one parameter placeholder).
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    /// Table name (or alias)
    pub table: String,
    /// Column name (or alias)
    pub name: String,
    /// Character set number
    pub charset: u16,
    /// Declared column length in bytes; sizes string scratch buffers
    pub column_length: u32,
    /// Declared wire type
    pub wire_type: WireType,
    /// Column flags
    pub flags: u16,
    /// Number of decimal digits
    pub decimals: u8,
    /// Longest value actually fetched for this column; zero until a
    /// store pass with UPDATE_MAX_LENGTH recomputes it
    pub max_length: u32,
}

impl ColumnMeta {
    /// Check if the column is NOT NULL.
    #[must_use]
    pub const fn is_not_null(&self) -> bool {
        self.flags & column_flags::NOT_NULL != 0
    }

    /// Check if the column is unsigned.
    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    /// Check if the column is auto-increment.
    #[must_use]
    pub const fn is_auto_increment(&self) -> bool {
        self.flags & column_flags::AUTO_INCREMENT != 0
    }

    /// Check if the column holds binary data.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        self.flags & column_flags::BINARY != 0
    }
}

/// Owned snapshot of a result set's shape, detached from the statement
/// that produced it. Survives re-prepare and close.
#[derive(Debug, Clone)]
pub struct ResultMetadata {
    /// Number of columns in the result set
    pub field_count: u32,
    /// Column descriptors in select order
    pub columns: Vec<ColumnMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_roundtrip() {
        for code in [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F, 0x10, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF,
        ] {
            assert_eq!(WireType::from_u8(code) as u8, code);
        }
    }

    #[test]
    fn unknown_code_falls_back_to_string() {
        assert_eq!(WireType::from_u8(0x42), WireType::String);
    }

    #[test]
    fn families_partition_every_type() {
        let all = [
            WireType::Decimal,
            WireType::Tiny,
            WireType::Short,
            WireType::Long,
            WireType::Float,
            WireType::Double,
            WireType::Null,
            WireType::Timestamp,
            WireType::LongLong,
            WireType::Int24,
            WireType::Date,
            WireType::Time,
            WireType::DateTime,
            WireType::Year,
            WireType::NewDate,
            WireType::VarChar,
            WireType::Bit,
            WireType::Json,
            WireType::NewDecimal,
            WireType::Enum,
            WireType::Set,
            WireType::TinyBlob,
            WireType::MediumBlob,
            WireType::LongBlob,
            WireType::Blob,
            WireType::VarString,
            WireType::String,
            WireType::Geometry,
        ];
        for ty in all {
            let memberships = [
                ty.is_int_family(),
                ty == WireType::Tiny,
                ty.is_float_family(),
                ty.is_decimal(),
                ty.is_temporal(),
                ty.is_string_family(),
            ];
            let count = memberships.iter().filter(|m| **m).count();
            assert_eq!(count, 1, "{} must belong to exactly one family", ty.name());
        }
    }

    #[test]
    fn year_is_temporal_and_null_is_int() {
        // Buffer-shaping groups inherited from the classic client: YEAR
        // goes through the calendar slot, NULL through the int slot.
        assert!(WireType::Year.is_temporal());
        assert!(WireType::Null.is_int_family());
    }

    #[test]
    fn column_flag_helpers() {
        let col = ColumnMeta {
            table: "t".into(),
            name: "id".into(),
            charset: 63,
            column_length: 11,
            wire_type: WireType::Long,
            flags: column_flags::NOT_NULL | column_flags::UNSIGNED | column_flags::AUTO_INCREMENT,
            decimals: 0,
            max_length: 0,
        };
        assert!(col.is_not_null());
        assert!(col.is_unsigned());
        assert!(col.is_auto_increment());
        assert!(!col.is_binary());
    }
}

//! Parameter binding.
//!
//! [`Statement::bind_params`] turns one [`Value`] per placeholder into
//! the wire slot that the next execute will encode. Inference follows a
//! fixed priority: null first, then integers that fit a signed 32-bit
//! slot, booleans as tiny ints, unsigned values that fit 32 bits, any
//! remaining numeric as a double, timestamps as wire temporals, and
//! text last. An integer too large for either 32-bit slot is bound as a
//! double, so magnitudes beyond 2^53 lose precision; callers that need
//! exact wide integers should bind them as text.
//!
//! Binding is atomic: either every slot converts and the whole set
//! replaces the previous one, or the statement keeps its old slots.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::protocol::ParamSlot;
use crate::statement::Statement;
use crate::temporal::WireDateTime;
use crate::value::Value;

impl<S: Read + Write> Statement<S> {
    /// Binds one value per placeholder of the prepared statement.
    ///
    /// The slice length must equal the placeholder count reported by
    /// prepare. Slots are freshly converted on every call; previously
    /// bound slots are dropped only once the whole slice converts.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotInitialized`] after close, with
    /// [`Error::NotPrepared`] before a successful prepare, with
    /// [`Error::ArityMismatch`] when the slice length is wrong, and
    /// with [`Error::TimeOutOfRange`] when a timestamp does not fit the
    /// wire calendar.
    pub fn bind_params(&mut self, values: &[Value]) -> Result<bool> {
        if self.channel.is_none() {
            return Err(Error::NotInitialized);
        }
        if !self.prepared {
            return Err(Error::NotPrepared);
        }
        if values.len() != usize::from(self.param_count) {
            return Err(Error::ArityMismatch {
                expected: usize::from(self.param_count),
                provided: values.len(),
            });
        }

        let offset = self.config.temporal.offset_seconds();
        let mut slots = Vec::with_capacity(values.len());
        for value in values {
            slots.push(infer_slot(value, offset)?);
        }
        self.params = Some(slots);
        Ok(true)
    }
}

/// Converts one bound value into its wire slot.
fn infer_slot(value: &Value, offset_seconds: i32) -> Result<ParamSlot> {
    Ok(match *value {
        Value::Null => ParamSlot::Null,
        Value::Bool(v) => ParamSlot::Tiny { value: u8::from(v) },
        Value::Int(v) => int_slot(v),
        Value::UInt(v) => {
            if let Ok(v) = i64::try_from(v) {
                int_slot(v)
            } else {
                ParamSlot::Double { value: v as f64 }
            }
        }
        Value::Double(v) => ParamSlot::Double { value: v },
        Value::DateTime(millis) => match WireDateTime::from_epoch_millis(millis, offset_seconds) {
            Some(value) => ParamSlot::DateTime { value },
            None => return Err(Error::TimeOutOfRange { millis }),
        },
        Value::Text(ref s) => ParamSlot::Text {
            bytes: s.clone().into_bytes(),
        },
    })
}

/// Slot for a signed magnitude: signed 32-bit when it fits, unsigned
/// 32-bit next, double beyond that.
#[allow(clippy::cast_precision_loss)]
fn int_slot(v: i64) -> ParamSlot {
    if let Ok(value) = i32::try_from(v) {
        ParamSlot::Int { value }
    } else if let Ok(value) = u32::try_from(v) {
        ParamSlot::Uint { value }
    } else {
        ParamSlot::Double { value: v as f64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_binds_null() {
        assert_eq!(infer_slot(&Value::Null, 0).unwrap(), ParamSlot::Null);
    }

    #[test]
    fn bool_binds_tiny() {
        assert_eq!(
            infer_slot(&Value::Bool(true), 0).unwrap(),
            ParamSlot::Tiny { value: 1 }
        );
        assert_eq!(
            infer_slot(&Value::Bool(false), 0).unwrap(),
            ParamSlot::Tiny { value: 0 }
        );
    }

    #[test]
    fn small_int_binds_signed() {
        assert_eq!(
            infer_slot(&Value::Int(-42), 0).unwrap(),
            ParamSlot::Int { value: -42 }
        );
        assert_eq!(
            infer_slot(&Value::Int(i64::from(i32::MAX)), 0).unwrap(),
            ParamSlot::Int { value: i32::MAX }
        );
    }

    #[test]
    fn int_past_signed_range_binds_unsigned() {
        assert_eq!(
            infer_slot(&Value::Int(3_000_000_000), 0).unwrap(),
            ParamSlot::Uint { value: 3_000_000_000 }
        );
        assert_eq!(
            infer_slot(&Value::UInt(u64::from(u32::MAX)), 0).unwrap(),
            ParamSlot::Uint { value: u32::MAX }
        );
    }

    #[test]
    fn small_unsigned_prefers_signed_slot() {
        assert_eq!(
            infer_slot(&Value::UInt(7), 0).unwrap(),
            ParamSlot::Int { value: 7 }
        );
    }

    #[test]
    fn wide_int_falls_back_to_double() {
        assert_eq!(
            infer_slot(&Value::Int(1 << 40), 0).unwrap(),
            ParamSlot::Double {
                value: (1u64 << 40) as f64
            }
        );
        assert_eq!(
            infer_slot(&Value::UInt(u64::MAX), 0).unwrap(),
            ParamSlot::Double { value: u64::MAX as f64 }
        );
    }

    #[test]
    fn double_binds_double() {
        assert_eq!(
            infer_slot(&Value::Double(2.5), 0).unwrap(),
            ParamSlot::Double { value: 2.5 }
        );
    }

    #[test]
    fn datetime_binds_wire_temporal() {
        // 2024-02-29 13:05:59.123 UTC
        let millis = 1_709_211_959_123;
        let slot = infer_slot(&Value::DateTime(millis), 0).unwrap();
        let ParamSlot::DateTime { value } = slot else {
            panic!("expected a datetime slot, got {slot:?}");
        };
        assert_eq!(
            (value.year, value.month, value.day),
            (2024, 2, 29)
        );
        assert_eq!((value.hour, value.minute, value.second), (13, 5, 59));
        assert_eq!(value.micros, 123_000);
    }

    #[test]
    fn datetime_honors_fixed_offset() {
        // Epoch midnight shifted one hour east lands at 01:00 local.
        let slot = infer_slot(&Value::DateTime(0), 3600).unwrap();
        let ParamSlot::DateTime { value } = slot else {
            panic!("expected a datetime slot, got {slot:?}");
        };
        assert_eq!((value.year, value.month, value.day), (1970, 1, 1));
        assert_eq!(value.hour, 1);
    }

    #[test]
    fn datetime_out_of_calendar_errors() {
        let millis = i64::MAX;
        assert!(matches!(
            infer_slot(&Value::DateTime(millis), 0),
            Err(Error::TimeOutOfRange { millis: m }) if m == millis
        ));
    }

    #[test]
    fn text_binds_utf8_bytes() {
        assert_eq!(
            infer_slot(&Value::Text("héllo".into()), 0).unwrap(),
            ParamSlot::Text {
                bytes: "héllo".as_bytes().to_vec()
            }
        );
    }
}

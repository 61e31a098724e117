//! Scalar coercions: `as_string`, `as_bool`, `as_iN`, `as_uN`, `as_f64`
//! (spec.md §4.B), each saturating at the requested width for
//! out-of-range magnitudes and returning [`Error::Invalid`] (`EINVAL`
//! in spec vocabulary) when a string payload doesn't parse as the
//! requested numeric type.

use crate::compact::{self, Scalar};
use crate::error::{Error, Result};
use crate::value::{BoxedPayload, Repr};
use crate::Value;

/// A value's numeric content widened to the broadest representation
/// that can hold it without loss, used as the common pivot every
/// `as_*` coercion saturates down from.
enum Numeric {
    Signed(i64),
    Unsigned(u64),
    Double(f64),
}

impl Value {
    fn numeric(&self) -> Result<Numeric> {
        match &self.0 {
            Repr::Compact(word) if compact::is_string(*word) => self.parse_numeric(),
            Repr::Compact(word) => Ok(match compact::decode_scalar(*word) {
                Scalar::Null => Numeric::Signed(0),
                Scalar::Bool(b) => Numeric::Signed(b as i64),
                Scalar::Signed(_, v) => Numeric::Signed(v),
                Scalar::Unsigned(_, v) => Numeric::Unsigned(v),
            }),
            Repr::Boxed(rc) => match &*rc.payload.borrow() {
                BoxedPayload::Null => Ok(Numeric::Signed(0)),
                BoxedPayload::Bool(b) => Ok(Numeric::Signed(*b as i64)),
                BoxedPayload::Int8(v) => Ok(Numeric::Signed(*v as i64)),
                BoxedPayload::Int16(v) => Ok(Numeric::Signed(*v as i64)),
                BoxedPayload::Int32(v) => Ok(Numeric::Signed(*v as i64)),
                BoxedPayload::Int64(v) => Ok(Numeric::Signed(*v)),
                BoxedPayload::UInt8(v) => Ok(Numeric::Unsigned(*v as u64)),
                BoxedPayload::UInt16(v) => Ok(Numeric::Unsigned(*v as u64)),
                BoxedPayload::UInt32(v) => Ok(Numeric::Unsigned(*v as u64)),
                BoxedPayload::UInt64(v) => Ok(Numeric::Unsigned(*v)),
                BoxedPayload::Double(v) => Ok(Numeric::Double(*v)),
                BoxedPayload::String(s) => Self::parse_numeric_str(s),
                BoxedPayload::Object(_) | BoxedPayload::Array(_) => {
                    Err(Error::InvalidArg(self.get_type()))
                }
            },
        }
    }

    fn parse_numeric(&self) -> Result<Numeric> {
        Self::parse_numeric_str(&self.as_string()?)
    }

    fn parse_numeric_str(s: &str) -> Result<Numeric> {
        if let Ok(v) = s.parse::<i64>() {
            return Ok(Numeric::Signed(v));
        }
        if let Ok(v) = s.parse::<u64>() {
            return Ok(Numeric::Unsigned(v));
        }
        if let Ok(v) = s.parse::<f64>() {
            return Ok(Numeric::Double(v));
        }
        Err(Error::Invalid)
    }

    /// `as_bool`: zero/empty-ish values are `false`, everything else
    /// `true`; a String parses `"true"`/`"false"` case-insensitively
    /// before falling back to numeric truthiness.
    pub fn as_bool(&self) -> Result<bool> {
        if let Repr::Boxed(rc) = &self.0 {
            if let BoxedPayload::String(s) = &*rc.payload.borrow() {
                if s.eq_ignore_ascii_case("true") {
                    return Ok(true);
                }
                if s.eq_ignore_ascii_case("false") {
                    return Ok(false);
                }
            }
        }
        Ok(match self.numeric()? {
            Numeric::Signed(v) => v != 0,
            Numeric::Unsigned(v) => v != 0,
            Numeric::Double(v) => v != 0.0,
        })
    }

    /// `as_string`: scalars render their literal text; Object/Array
    /// render via the compact pretty-printer (there is no separate
    /// "stringify a container" operation in spec.md, and this keeps
    /// `as_string` total over every `Type`).
    pub fn as_string(&self) -> Result<String> {
        match &self.0 {
            Repr::Compact(word) if compact::is_string(*word) => {
                let ptr = compact::decode_string_ptr(*word);
                // Safety: `ptr` is live for as long as `self`.
                Ok(unsafe { crate::compact_string::as_str(ptr) }.to_owned())
            }
            Repr::Compact(word) => Ok(match compact::decode_scalar(*word) {
                Scalar::Null => "null".to_owned(),
                Scalar::Bool(b) => b.to_string(),
                Scalar::Signed(_, v) => v.to_string(),
                Scalar::Unsigned(_, v) => v.to_string(),
            }),
            Repr::Boxed(rc) => match &*rc.payload.borrow() {
                BoxedPayload::Null => Ok("null".to_owned()),
                BoxedPayload::Bool(b) => Ok(b.to_string()),
                BoxedPayload::String(s) => Ok(s.clone()),
                BoxedPayload::Int8(v) => Ok(v.to_string()),
                BoxedPayload::Int16(v) => Ok(v.to_string()),
                BoxedPayload::Int32(v) => Ok(v.to_string()),
                BoxedPayload::Int64(v) => Ok(v.to_string()),
                BoxedPayload::UInt8(v) => Ok(v.to_string()),
                BoxedPayload::UInt16(v) => Ok(v.to_string()),
                BoxedPayload::UInt32(v) => Ok(v.to_string()),
                BoxedPayload::UInt64(v) => Ok(v.to_string()),
                BoxedPayload::Double(v) => Ok(v.to_string()),
                BoxedPayload::Object(_) | BoxedPayload::Array(_) => {
                    Ok(crate::pretty::print(self, crate::PrintStyle::Compact))
                }
            },
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        Ok(match self.numeric()? {
            Numeric::Signed(v) => v as f64,
            Numeric::Unsigned(v) => v as f64,
            Numeric::Double(v) => v,
        })
    }

    pub fn as_i8(&self) -> Result<i8> {
        self.as_i64_saturating().map(|v| v.clamp(i8::MIN as i64, i8::MAX as i64) as i8)
    }

    pub fn as_i16(&self) -> Result<i16> {
        self.as_i64_saturating()
            .map(|v| v.clamp(i16::MIN as i64, i16::MAX as i64) as i16)
    }

    pub fn as_i32(&self) -> Result<i32> {
        self.as_i64_saturating()
            .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }

    pub fn as_i64(&self) -> Result<i64> {
        self.as_i64_saturating()
    }

    pub fn as_u8(&self) -> Result<u8> {
        self.as_u64_saturating().map(|v| v.min(u8::MAX as u64) as u8)
    }

    pub fn as_u16(&self) -> Result<u16> {
        self.as_u64_saturating().map(|v| v.min(u16::MAX as u64) as u16)
    }

    pub fn as_u32(&self) -> Result<u32> {
        self.as_u64_saturating().map(|v| v.min(u32::MAX as u64) as u32)
    }

    pub fn as_u64(&self) -> Result<u64> {
        self.as_u64_saturating()
    }

    fn as_i64_saturating(&self) -> Result<i64> {
        Ok(match self.numeric()? {
            Numeric::Signed(v) => v,
            Numeric::Unsigned(v) => v.min(i64::MAX as u64) as i64,
            Numeric::Double(v) => {
                if v.is_nan() {
                    0
                } else {
                    v.clamp(i64::MIN as f64, i64::MAX as f64) as i64
                }
            }
        })
    }

    /// Saturating unsigned widening; a negative signed magnitude
    /// clamps to zero rather than reinterpreting its two's-complement
    /// bit pattern (the Open Question resolution in SPEC_FULL.md §4.E
    /// regarding `mrp_cson_uint32_value`'s delegation to a signed
    /// accessor — resolved here as a latent bug in the original, not
    /// reproduced).
    fn as_u64_saturating(&self) -> Result<u64> {
        Ok(match self.numeric()? {
            Numeric::Signed(v) => v.max(0) as u64,
            Numeric::Unsigned(v) => v,
            Numeric::Double(v) => {
                if v.is_nan() || v < 0.0 {
                    0
                } else {
                    v.min(u64::MAX as f64) as u64
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Context, CreateFlags, Payload};

    #[test]
    fn test_roundtrip_coercion_all_widths() {
        let ctx = Context::default();
        for v in [0i8, 1, -1, i8::MIN, i8::MAX] {
            let value = Value::create(&ctx, Payload::Int8(v), CreateFlags::Default).unwrap();
            assert_eq!(value.as_i8().unwrap(), v);
        }
    }

    #[test]
    fn test_saturating_clamp_on_narrowing() {
        let v = Value::create_i64(1000);
        assert_eq!(v.as_i8().unwrap(), i8::MAX);
        let v = Value::create_i64(-1000);
        assert_eq!(v.as_i8().unwrap(), i8::MIN);
    }

    #[test]
    fn test_negative_to_unsigned_saturates_at_zero() {
        let v = Value::create_i64(-5);
        assert_eq!(v.as_u32().unwrap(), 0);
    }

    #[test]
    fn test_string_parse_failure_is_invalid() {
        let ctx = Context::default();
        let v = Value::create(&ctx, Payload::String("not-a-number".into()), CreateFlags::Default).unwrap();
        assert!(matches!(v.as_i64(), Err(Error::Invalid)));
    }

    #[test]
    fn test_compact_string_roundtrip() {
        let ctx = Context::default();
        let v = Value::create(&ctx, Payload::String("hello".into()), CreateFlags::ForceCompact).unwrap();
        assert_eq!(v.get_type(), crate::Type::String);
        assert_eq!(v.as_string().unwrap(), "hello");
    }

    #[test]
    fn test_bool_string_parses_case_insensitively() {
        let ctx = Context::default();
        let v = Value::create(&ctx, Payload::String("TRUE".into()), CreateFlags::Default).unwrap();
        assert!(v.as_bool().unwrap());
    }
}

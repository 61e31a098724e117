//! Recursive, insertion-order pretty-printing (spec.md §4.B
//! "Pretty-printing: recursive, insertion-order, with or without
//! whitespace depending on a flag").
//!
//! Per Design Notes §9 ("replace [`%p`-style customization] with
//! explicit `to_string`/formatter traits or a `write_to(writer,
//! style)` method"), there is no runtime format-specifier
//! registration here: [`Value::write_to`] is the single entry point,
//! and `Display`/`Debug` are thin wrappers over it. An Object's
//! member names are resolved back through the symbol table reached
//! via its own weak `symbols` handle (spec.md §9 "an object does not
//! own its symbols... resolved through the table"), so printing never
//! needs a `Context` passed in explicitly.

use std::fmt;

use crate::compact::{self, Scalar};
use crate::value::{BoxedPayload, Repr};
use crate::Value;

/// With or without inserted whitespace (spec.md §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintStyle {
    /// No inserted whitespace: `{"a":1,"b":[1,2]}`.
    Compact,
    /// Two-space indentation per nesting level.
    Pretty,
}

impl Value {
    /// Write this value as text to `w`. An Object whose owning
    /// `Context` has already been dropped prints its members' symbol
    /// ids in place of names (best effort; never panics).
    pub fn write_to(&self, w: &mut dyn fmt::Write, style: PrintStyle) -> fmt::Result {
        write_value(self, w, style, 0)
    }
}

/// Convenience used by [`crate::coerce`]'s `as_string` for Object/Array.
pub(crate) fn print(value: &Value, style: PrintStyle) -> String {
    let mut s = String::new();
    // A `String`'s `fmt::Write` impl is infallible (growth is the only
    // failure mode, and `String` never reports it as an `Err`).
    let _ = value.write_to(&mut s, style);
    s
}

fn indent(w: &mut dyn fmt::Write, style: PrintStyle, depth: usize) -> fmt::Result {
    if style == PrintStyle::Pretty {
        write!(w, "\n{:width$}", "", width = depth * 2)?;
    }
    Ok(())
}

fn write_value(value: &Value, w: &mut dyn fmt::Write, style: PrintStyle, depth: usize) -> fmt::Result {
    match &value.0 {
        Repr::Compact(word) if compact::is_string(*word) => {
            let ptr = compact::decode_string_ptr(*word);
            // Safety: `ptr` is live for as long as `value`.
            write_string(w, unsafe { crate::compact_string::as_str(ptr) })
        }
        Repr::Compact(word) => match compact::decode_scalar(*word) {
            Scalar::Null => write!(w, "null"),
            Scalar::Bool(b) => write!(w, "{b}"),
            Scalar::Signed(_, v) => write!(w, "{v}"),
            Scalar::Unsigned(_, v) => write!(w, "{v}"),
        },
        Repr::Boxed(rc) => match &*rc.payload.borrow() {
            BoxedPayload::Null => write!(w, "null"),
            BoxedPayload::Bool(b) => write!(w, "{b}"),
            BoxedPayload::String(s) => write_string(w, s),
            BoxedPayload::Int8(v) => write!(w, "{v}"),
            BoxedPayload::Int16(v) => write!(w, "{v}"),
            BoxedPayload::Int32(v) => write!(w, "{v}"),
            BoxedPayload::Int64(v) => write!(w, "{v}"),
            BoxedPayload::UInt8(v) => write!(w, "{v}"),
            BoxedPayload::UInt16(v) => write!(w, "{v}"),
            BoxedPayload::UInt32(v) => write!(w, "{v}"),
            BoxedPayload::UInt64(v) => write!(w, "{v}"),
            BoxedPayload::Double(v) => write!(w, "{v}"),
            BoxedPayload::Array(arr) => {
                w.write_char('[')?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        w.write_char(',')?;
                    }
                    indent(w, style, depth + 1)?;
                    write_value(item, w, style, depth + 1)?;
                }
                if !arr.is_empty() {
                    indent(w, style, depth)?;
                }
                w.write_char(']')
            }
            BoxedPayload::Object(obj) => {
                let symbols = rc.symbols.upgrade();
                w.write_char('{')?;
                for (i, member) in obj.iter().enumerate() {
                    if i > 0 {
                        w.write_char(',')?;
                    }
                    indent(w, style, depth + 1)?;
                    match &symbols {
                        Some(table) => write_string(w, table.borrow().lookup_by_id(member.symbol_id).unwrap_or("?")),
                        None => write!(w, "\"#{}\"", member.symbol_id),
                    }?;
                    w.write_char(':')?;
                    if style == PrintStyle::Pretty {
                        w.write_char(' ')?;
                    }
                    write_value(&member.value, w, style, depth + 1)?;
                }
                if !obj.is_empty() {
                    indent(w, style, depth)?;
                }
                w.write_char('}')
            }
        },
    }
}

fn write_string(w: &mut dyn fmt::Write, s: &str) -> fmt::Result {
    w.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => w.write_str("\\\"")?,
            '\\' => w.write_str("\\\\")?,
            '\n' => w.write_str("\\n")?,
            '\t' => w.write_str("\\t")?,
            _ => w.write_char(c)?,
        }
    }
    w.write_char('"')
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_to(f, PrintStyle::Compact)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Context, CreateFlags, Payload};

    #[test]
    fn test_compact_array_roundtrip_text() {
        let ctx = Context::default();
        let arr = Value::create(&ctx, Payload::Array(crate::Array::new()), CreateFlags::Default).unwrap();
        arr.array_push(Value::create_i64(1)).unwrap();
        arr.array_push(Value::create_i64(2)).unwrap();
        assert_eq!(print(&arr, PrintStyle::Compact), "[1,2]");
    }

    #[test]
    fn test_object_prints_insertion_order() {
        let ctx = Context::default();
        let obj = Value::create(&ctx, Payload::Object(crate::Object::new()), CreateFlags::Default).unwrap();
        obj.object_set(&ctx, "b", Value::create_i64(2)).unwrap();
        obj.object_set(&ctx, "a", Value::create_i64(1)).unwrap();
        assert_eq!(print(&obj, PrintStyle::Compact), "{\"b\":2,\"a\":1}");
    }

    #[test]
    fn test_pretty_style_adds_whitespace() {
        let ctx = Context::default();
        let obj = Value::create(&ctx, Payload::Object(crate::Object::new()), CreateFlags::Default).unwrap();
        obj.object_set(&ctx, "a", Value::create_i64(1)).unwrap();
        let s = print(&obj, PrintStyle::Pretty);
        assert!(s.contains('\n'));
    }

    #[test]
    fn test_string_escaping() {
        let ctx = Context::default();
        let v = Value::create(&ctx, Payload::String("a\"b".into()), CreateFlags::Default).unwrap();
        assert_eq!(print(&v, PrintStyle::Compact), "\"a\\\"b\"");
    }
}

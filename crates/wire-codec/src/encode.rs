//! `encode(message-of-fields) → bytes` (spec.md §4.C).

use bytes::{BufMut, Bytes, BytesMut};

use crate::field::{Field, FieldValue};
use crate::tag::Tag;

pub fn encode(fields: &[Field]) -> Bytes {
    let mut buf = BytesMut::new();
    for field in fields {
        encode_field(&mut buf, field);
    }
    buf.freeze()
}

fn encode_field(buf: &mut BytesMut, field: &Field) {
    buf.put_u16(field.tag.code());
    buf.put_u16(field.value.field_type().code());
    match &field.value {
        FieldValue::U8(v) => buf.put_u8(*v),
        FieldValue::U16(v) => buf.put_u16(*v),
        FieldValue::U32(v) => buf.put_u32(*v),
        FieldValue::S16(v) => buf.put_i16(*v),
        FieldValue::S32(v) => buf.put_i32(*v),
        FieldValue::Double(v) => buf.put_f64(*v),
        FieldValue::Bool(v) => buf.put_u8(if *v { 1 } else { 0 }),
        FieldValue::String(s) => encode_str(buf, s),
        FieldValue::ArrayOfString(items) => {
            buf.put_u16(items.len() as u16);
            for s in items {
                encode_str(buf, s);
            }
        }
        FieldValue::Marker => {}
    }
}

fn encode_str(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

/// A field with `tag: MESSAGE_END` and no payload, appended once by
/// the builder at the end of every message (spec.md §6: every
/// message shape ends `..., MESSAGE_END`).
pub fn message_end_field() -> Field {
    Field {
        tag: Tag::MessageEnd,
        value: FieldValue::Marker,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decode::Cursor;

    #[test]
    fn test_encode_decode_roundtrip() {
        let fields = vec![
            Field {
                tag: Tag::SequenceNo,
                value: FieldValue::U32(7),
            },
            Field {
                tag: Tag::ZoneName,
                value: FieldValue::String("zone-a".into()),
            },
            message_end_field(),
        ];
        let bytes = encode(&fields);
        let mut cursor = Cursor::new(bytes);
        assert_eq!(cursor.next().unwrap().unwrap(), fields[0]);
        assert_eq!(cursor.next().unwrap().unwrap(), fields[1]);
        assert_eq!(cursor.next().unwrap().unwrap(), fields[2]);
        assert!(cursor.next().is_none());
    }
}

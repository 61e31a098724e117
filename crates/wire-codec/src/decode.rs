//! `decode(bytes) → cursor`; `iterate(cursor) → Option<(tag,type,value)>`
//! plus the typed `fetch_*` accessors (spec.md §4.C).

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};
use crate::field::{Field, FieldType, FieldValue};
use crate::tag::Tag;

/// A cursor over one encoded message. `Cursor` is also an `Iterator`,
/// matching spec.md's `iterate(cursor) -> Option<(tag,type,value)>`;
/// iteration stops after yielding the `MESSAGE_END` field or at the
/// first decode error.
pub struct Cursor {
    buf: Bytes,
    done: bool,
}

impl Cursor {
    pub fn new(bytes: Bytes) -> Self {
        Self { buf: bytes, done: false }
    }

    fn read_field(&mut self) -> Result<Field> {
        if self.buf.remaining() < 4 {
            return Err(Error::UnexpectedEof);
        }
        let tag_code = self.buf.get_u16();
        let type_code = self.buf.get_u16();
        let tag = Tag::from_code(tag_code).ok_or(Error::UnknownTag(tag_code))?;
        let ty = FieldType::from_code(type_code).ok_or(Error::UnknownType(type_code))?;
        let value = self.read_payload(ty)?;
        Ok(Field { tag, value })
    }

    fn read_payload(&mut self, ty: FieldType) -> Result<FieldValue> {
        Ok(match ty {
            FieldType::U8 => {
                self.require(1)?;
                FieldValue::U8(self.buf.get_u8())
            }
            FieldType::U16 => {
                self.require(2)?;
                FieldValue::U16(self.buf.get_u16())
            }
            FieldType::U32 => {
                self.require(4)?;
                FieldValue::U32(self.buf.get_u32())
            }
            FieldType::S16 => {
                self.require(2)?;
                FieldValue::S16(self.buf.get_i16())
            }
            FieldType::S32 => {
                self.require(4)?;
                FieldValue::S32(self.buf.get_i32())
            }
            FieldType::Double => {
                self.require(8)?;
                FieldValue::Double(self.buf.get_f64())
            }
            FieldType::Bool => {
                self.require(1)?;
                FieldValue::Bool(self.buf.get_u8() != 0)
            }
            FieldType::String => FieldValue::String(self.read_string()?),
            FieldType::ArrayOfString => {
                self.require(2)?;
                let count = self.buf.get_u16();
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(self.read_string()?);
                }
                FieldValue::ArrayOfString(items)
            }
            FieldType::Marker => FieldValue::Marker,
        })
    }

    fn read_string(&mut self) -> Result<String> {
        self.require(2)?;
        let len = self.buf.get_u16() as usize;
        self.require(len)?;
        let bytes = self.buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::Utf8)
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            Err(Error::UnexpectedEof)
        } else {
            Ok(())
        }
    }

    /// Bytes left unconsumed once iteration has stopped; a non-zero
    /// count after `MESSAGE_END` indicates trailing garbage.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn expect(&mut self, tag: Tag, ty: FieldType) -> Result<FieldValue> {
        let field = self.next().ok_or(Error::MissingField(tag))??;
        if field.tag != tag {
            return Err(Error::TagMismatch {
                expected: tag,
                found: field.tag,
            });
        }
        if field.value.field_type() != ty {
            return Err(Error::TypeMismatch {
                tag,
                expected: ty,
                found: field.value.field_type(),
            });
        }
        Ok(field.value)
    }

    pub fn fetch_u16(&mut self, tag: Tag) -> Result<u16> {
        match self.expect(tag, FieldType::U16)? {
            FieldValue::U16(v) => Ok(v),
            _ => unreachable!("expect() already checked the field type"),
        }
    }

    pub fn fetch_u32(&mut self, tag: Tag) -> Result<u32> {
        match self.expect(tag, FieldType::U32)? {
            FieldValue::U32(v) => Ok(v),
            _ => unreachable!("expect() already checked the field type"),
        }
    }

    pub fn fetch_s16(&mut self, tag: Tag) -> Result<i16> {
        match self.expect(tag, FieldType::S16)? {
            FieldValue::S16(v) => Ok(v),
            _ => unreachable!("expect() already checked the field type"),
        }
    }

    pub fn fetch_s32(&mut self, tag: Tag) -> Result<i32> {
        match self.expect(tag, FieldType::S32)? {
            FieldValue::S32(v) => Ok(v),
            _ => unreachable!("expect() already checked the field type"),
        }
    }

    pub fn fetch_string(&mut self, tag: Tag) -> Result<String> {
        match self.expect(tag, FieldType::String)? {
            FieldValue::String(v) => Ok(v),
            _ => unreachable!("expect() already checked the field type"),
        }
    }

    pub fn fetch_bool(&mut self, tag: Tag) -> Result<bool> {
        match self.expect(tag, FieldType::Bool)? {
            FieldValue::Bool(v) => Ok(v),
            _ => unreachable!("expect() already checked the field type"),
        }
    }

    pub fn fetch_array_of_string(&mut self, tag: Tag) -> Result<Vec<String>> {
        match self.expect(tag, FieldType::ArrayOfString)? {
            FieldValue::ArrayOfString(v) => Ok(v),
            _ => unreachable!("expect() already checked the field type"),
        }
    }

    /// Consume and discard a `SECTION_END`/`MESSAGE_END` marker,
    /// failing if the next field isn't exactly that tag.
    pub fn fetch_marker(&mut self, tag: Tag) -> Result<()> {
        self.expect(tag, FieldType::Marker)?;
        Ok(())
    }
}

impl Iterator for Cursor {
    type Item = Result<Field>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.buf.remaining() == 0 {
            return None;
        }
        let result = self.read_field();
        match &result {
            Ok(field) if field.tag == Tag::MessageEnd => self.done = true,
            Err(_) => self.done = true,
            _ => {}
        }
        Some(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::{encode, message_end_field};

    #[test]
    fn test_fetch_typed_mismatch_errors() {
        let fields = vec![Field {
            tag: Tag::SequenceNo,
            value: FieldValue::U32(1),
        }];
        let mut cursor = Cursor::new(encode(&fields));
        let err = cursor.fetch_u16(Tag::SequenceNo).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_fetch_tag_mismatch_errors() {
        let fields = vec![Field {
            tag: Tag::SequenceNo,
            value: FieldValue::U32(1),
        }];
        let mut cursor = Cursor::new(encode(&fields));
        let err = cursor.fetch_u32(Tag::ResourceSetId).unwrap_err();
        assert!(matches!(err, Error::TagMismatch { .. }));
    }

    #[test]
    fn test_trailing_bytes_detected_after_message_end() {
        let fields = vec![message_end_field()];
        let mut bytes = encode(&fields).to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut cursor = Cursor::new(Bytes::from(bytes));
        assert!(cursor.next().unwrap().unwrap().tag == Tag::MessageEnd);
        assert_eq!(cursor.remaining(), 3);
    }

    #[test]
    fn test_unexpected_eof() {
        let cursor_bytes = Bytes::from_static(&[0, 1]); // tag only, no type/payload
        let mut cursor = Cursor::new(cursor_bytes);
        assert!(matches!(cursor.next().unwrap().unwrap_err(), Error::UnexpectedEof));
    }
}

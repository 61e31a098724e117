//! A schema-driven field builder (Design Notes §9: "schema-driven
//! builder to avoid the repeated boilerplate of tag/type/value
//! appends"). `protocol.rs` in `resource-proxy` assembles each of
//! spec.md §6's message shapes through this rather than hand-rolling
//! `Field { tag, value }` literals at every call site.

use bytes::Bytes;

use crate::encode::{encode, message_end_field};
use crate::field::{Field, FieldValue};
use crate::tag::Tag;

#[derive(Debug, Default)]
pub struct MessageBuilder {
    fields: Vec<Field>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, tag: Tag, value: FieldValue) -> Self {
        self.fields.push(Field { tag, value });
        self
    }

    pub fn u8(self, tag: Tag, v: u8) -> Self {
        self.push(tag, FieldValue::U8(v))
    }

    pub fn u16(self, tag: Tag, v: u16) -> Self {
        self.push(tag, FieldValue::U16(v))
    }

    pub fn u32(self, tag: Tag, v: u32) -> Self {
        self.push(tag, FieldValue::U32(v))
    }

    pub fn s16(self, tag: Tag, v: i16) -> Self {
        self.push(tag, FieldValue::S16(v))
    }

    pub fn s32(self, tag: Tag, v: i32) -> Self {
        self.push(tag, FieldValue::S32(v))
    }

    pub fn double(self, tag: Tag, v: f64) -> Self {
        self.push(tag, FieldValue::Double(v))
    }

    pub fn bool(self, tag: Tag, v: bool) -> Self {
        self.push(tag, FieldValue::Bool(v))
    }

    pub fn string(self, tag: Tag, v: impl Into<String>) -> Self {
        self.push(tag, FieldValue::String(v.into()))
    }

    pub fn array_of_string(self, tag: Tag, v: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.push(tag, FieldValue::ArrayOfString(v.into_iter().map(Into::into).collect()))
    }

    /// Appends a `SECTION_END` marker (spec.md §6: terminates a
    /// per-resource section within a create message).
    pub fn section_end(self) -> Self {
        self.push(Tag::SectionEnd, FieldValue::Marker)
    }

    /// Appends `MESSAGE_END` and encodes the accumulated fields.
    pub fn end(mut self) -> Bytes {
        self.fields.push(message_end_field());
        encode(&self.fields)
    }

    /// Escape hatch for assembling a message from fields built up by
    /// other means (e.g. appending another builder's fields as a
    /// repeated group) before finishing with [`MessageBuilder::end`].
    pub fn extend(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }
}

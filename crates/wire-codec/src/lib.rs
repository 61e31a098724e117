//! A tag-length-value wire codec (spec.md §4.C): "A message is a
//! sequence of tagged fields, terminated by an `END` tag." The codec
//! is pure and agnostic to message semantics — `resource-proxy`'s
//! `protocol` module assembles and interprets the actual six message
//! shapes of spec.md §6 on top of the primitives here.
//!
//! Grounded on the explicit per-crate `Error` enum pattern used
//! throughout the teacher (`gazette::Error`), generalized here to a
//! length-prefixed TLV format instead of protobuf, since this
//! protocol is the spec's own custom wire format, not gRPC.

mod builder;
mod decode;
mod encode;
mod error;
mod field;
mod tag;

pub use builder::MessageBuilder;
pub use decode::Cursor;
pub use encode::{encode, message_end_field};
pub use error::{Error, Result};
pub use field::{Field, FieldType, FieldValue};
pub use tag::Tag;

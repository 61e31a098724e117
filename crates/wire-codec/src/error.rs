/// Errors raised while decoding a TLV message. Grounded on the
/// explicit, `#[error(...)]`-annotated enums threaded through the
/// teacher (`gazette::Error`, `json::schema::intern::Error`): one
/// variant per distinct failure shape, never a bare string.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("unexpected end of message while decoding a field")]
    UnexpectedEof,

    #[error("{0} trailing byte(s) after MESSAGE_END")]
    TrailingBytes(usize),

    #[error("unknown field tag {0}")]
    UnknownTag(u16),

    #[error("unknown field type {0}")]
    UnknownType(u16),

    #[error("field payload is not valid UTF-8")]
    Utf8,

    #[error("field {tag:?} expected type {expected:?}, found {found:?}")]
    TypeMismatch {
        tag: crate::tag::Tag,
        expected: crate::field::FieldType,
        found: crate::field::FieldType,
    },

    #[error("expected field {expected:?}, found {found:?}")]
    TagMismatch {
        expected: crate::tag::Tag,
        found: crate::tag::Tag,
    },

    #[error("message ended before the expected field {0:?} was seen")]
    MissingField(crate::tag::Tag),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by CSON value construction, coercion, and symbol
/// interning. Kinds follow the policy documented for the core: local
/// recoverables (a missing member) are represented as `Option`/`None`
/// at the call site rather than as an `Error` variant here.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("value of type {0:?} cannot be used as an object or array")]
    InvalidArg(crate::Type),

    #[error("integer {0} is out of range for a compact-forced value")]
    OutOfRange(i64),

    #[error("string payload does not parse as the requested numeric type")]
    Invalid,

    #[error("allocation failed for a {0}-byte compact string")]
    OutOfMemory(usize),

    #[error("symbol '{0}' is not interned")]
    NotFound(String),

    #[error("expect(ALL) pin counter would go negative")]
    Overflow,
}

pub type Result<T> = std::result::Result<T, Error>;

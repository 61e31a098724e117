/// Error kinds per spec.md §7, realized as a single `thiserror`-derived
/// enum for this crate's entire surface (the widest of the three
/// crate `Error` enums — see SPEC_FULL.md §7 — since only the proxy
/// touches a transport or a remote protocol).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("overflow: {0}")]
    Overflow(String),

    #[error("transport error")]
    Io(#[from] std::io::Error),

    #[error("malformed or out-of-schema server message: {0}")]
    Protocol(String),

    #[error(transparent)]
    Wire(#[from] wire_codec::Error),

    #[error(transparent)]
    Cson(#[from] cson::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

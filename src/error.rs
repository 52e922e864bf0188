use thiserror::Error;

/// Crate-local result alias, mirroring the teacher's `Result<_, &'static str>`
/// convention but with a real error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the public `Tree` API.
///
/// `InvalidPointer` (dereference of raw pointer 0) is deliberately absent:
/// per the error handling policy, that case indicates internal corruption
/// and traps via `panic!` at the pointer-decode boundary rather than
/// returning a value.
#[derive(Error, Debug)]
pub enum Error {
    #[error("key or value size does not match the tree's configured sizes")]
    InvalidKeySize,

    #[error("key already exists")]
    KeyAlreadyExists,

    #[error("key not found")]
    NotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

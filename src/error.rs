//! Typed error surface for every fallible operation (ambient error handling,
//! grounded on the `thiserror`-based error enums of the pack's userspace
//! FUSE filesystems rather than the teacher, which has none).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no space left on device")]
    NoSpace,

    #[error("file too big")]
    TooBig,

    #[error("name too long")]
    NameTooLong,

    #[error("no such entry")]
    NotFound,

    #[error("entry already exists")]
    Exists,

    #[error("directory not empty")]
    NotEmpty,

    #[error("not a directory")]
    NotDir,

    #[error("is a directory")]
    IsDir,

    #[error("invalid argument")]
    Invalid,

    #[error("out of memory")]
    NoMem,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

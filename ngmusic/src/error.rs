use crate::{codec, compiler, module, rom};
use std::io;
use thiserror::Error;

/// The result type for top-level `ngmusic` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for top-level `ngmusic` operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Module(Box<module::Error>),

    #[error(transparent)]
    Codec(Box<codec::Error>),

    #[error(transparent)]
    Compiler(Box<compiler::Error>),

    #[error(transparent)]
    Rom(Box<rom::Error>),

    #[error(transparent)]
    Io(Box<io::Error>),
}

from_error_boxed!(Error::Module, module::Error);
from_error_boxed!(Error::Codec, codec::Error);
from_error_boxed!(Error::Compiler, compiler::Error);
from_error_boxed!(Error::Rom, rom::Error);
from_error_boxed!(Error::Io, io::Error);

use thiserror::Error;

use crate::bytecode::compile_error::CompileError;
use crate::runtime::runtime_error::RuntimeError;
use crate::serial::error::SerializationError;

/// Any error the crate can produce, for hosts that drive compile, run and
/// persistence through one `?` chain.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

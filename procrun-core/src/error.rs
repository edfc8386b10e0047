use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcrunError {
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Spawn error: {0}")]
    Spawn(String),

    #[error("Wait error: {0}")]
    Wait(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Executable not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, ProcrunError>;

use symros_ir::VerifyError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstrumentError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("input IR is malformed: {0}")]
    InvalidInput(#[source] VerifyError),

    #[error("instrumented IR is malformed: {0}")]
    InvalidOutput(#[source] VerifyError),
}

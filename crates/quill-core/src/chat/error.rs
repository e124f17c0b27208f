use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Round limit of {0} exceeded")]
    RoundLimitExceeded(usize),

    #[error("Cancelled")]
    Cancelled,
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Insufficient funds in wallet {0}")]
    InsufficientFunds(String),
    #[error("Wallet {0} would exceed its maximum balance")]
    InsufficientCapacity(String),
    #[error("Transfer limit exceeded for wallet {0}")]
    LimitExceeded(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("One-time code expired")]
    OtpExpired,
    #[error("One-time code mismatch")]
    OtpMismatch,
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),
    #[error("Malformed record: {0}")]
    Record(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

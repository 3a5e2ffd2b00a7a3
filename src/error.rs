//! Error taxonomy for invoice and factoring operations

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invoice must contain at least one line item")]
    NoLineItems,
    #[error("Line item {0} has an empty description")]
    EmptyDescription(usize),
    #[error("Line item {0} must have a quantity greater than zero")]
    ZeroQuantity(usize),
    #[error("Client email is not set")]
    MissingClientEmail,
    #[error("Client email '{0}' is not a valid address")]
    InvalidClientEmail(String),
    #[error("Invoice amounts overflowed")]
    AmountOverflow,
    #[error("Stored totals do not match the line items")]
    TotalsMismatch,
    #[error("Bid amount must be greater than zero")]
    ZeroBidAmount,
    #[error("Bid amount {amount} exceeds the invoice total {total}")]
    BidExceedsTotal { amount: u64, total: u64 },
    #[error("Due date is outside the storable range")]
    DueDateOutOfRange,
    #[error("Discount fee of {0} basis points is outside (0, 10000)")]
    FeeOutOfRange(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum InvoiceError {
    #[error("Actor is not authenticated")]
    NotAuthenticated,
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("State changed, please refresh: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl InvoiceError {
    /// A lost optimistic write. The caller may re-fetch and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InvoiceError::Conflict(_))
    }
}

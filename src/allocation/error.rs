use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Payment amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Unknown allocation strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown allocation category: {0}")]
    UnknownCategory(String),

    #[error("Category listed twice in custom order: {0}")]
    DuplicateCategory(String),

    #[error("Custom order must list at least one category")]
    EmptyCustomOrder,

    #[error("Custom strategy requires a custom order")]
    MissingCustomOrder,
}

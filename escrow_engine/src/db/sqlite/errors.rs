use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Stored value could not be converted: {0}")]
    ConversionError(String),
    #[error("Order {0} was not found")]
    OrderNotFound(String),
}

impl From<crate::db_types::ConversionError> for SqliteDatabaseError {
    fn from(e: crate::db_types::ConversionError) -> Self {
        Self::ConversionError(e.to_string())
    }
}

impl From<escrow_common::MoneyConversionError> for SqliteDatabaseError {
    fn from(e: escrow_common::MoneyConversionError) -> Self {
        Self::ConversionError(e.to_string())
    }
}

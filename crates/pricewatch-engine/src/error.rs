use pricewatch_db::DbError;
use pricewatch_scraper::RegistryError;
use pricewatch_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("item {0} not found")]
    ItemNotFound(i64),

    #[error("data store error: {0}")]
    Db(#[from] DbError),

    #[error("queue store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateError {
    /// Network failure or non-2xx response while retrieving the rates page.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The page no longer matches the expected rates table layout.
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Corrupt state: {0}")]
    CorruptState(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

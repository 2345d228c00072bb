use thiserror::Error;

#[derive(Error, Debug)]
pub enum TruckScoutError {
    #[error("Data error: {0}")]
    Data(#[from] truckscout_data::DataError),
    #[error("Refresh error: {0}")]
    Refresh(#[from] crate::refresh::RefreshError),
    #[error("Provider error: {0}")]
    Provider(#[from] crate::providers::ProviderError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TruckScoutError>;

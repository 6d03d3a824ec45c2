use thiserror::Error;

/// Fatal conditions that abort a reporting cycle before delivery.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("missing data: {0}")]
    MissingData(String),

    #[error("{service} call failed: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },
}

impl CycleError {
    pub fn external(service: &'static str, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service,
            message: message.into(),
        }
    }
}

use thiserror::Error;

/// Failures raised by a completion provider or by validation of its output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider rejected the credentials")]
    AuthInvalid,

    #[error("provider rate limited the request (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("network error: {0}")]
    Network(String),

    #[error("provider fault (HTTP {status}): {message}")]
    ProviderFault {
        status: u16,
        message: String,
        recoverable: bool,
    },

    #[error("provider call timed out after {0}ms")]
    Timeout(u64),

    #[error("response violated contract: {0}")]
    SchemaMismatch(String),

    #[error("no completion provider configured")]
    NotConfigured,
}

impl ProviderError {
    /// Whether retrying the same request later can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ProviderError::AuthInvalid | ProviderError::NotConfigured => false,
            ProviderError::ProviderFault { recoverable, .. } => *recoverable,
            ProviderError::RateLimited { .. }
            | ProviderError::Network(_)
            | ProviderError::Timeout(_)
            | ProviderError::SchemaMismatch(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::AuthInvalid => "auth_invalid",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Network(_) => "network",
            ProviderError::ProviderFault { .. } => "provider_fault",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::SchemaMismatch(_) => "schema_mismatch",
            ProviderError::NotConfigured => "not_configured",
        }
    }
}

/// Structural problems found while validating provider JSON.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("field `{field}` should be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}

impl From<ContractError> for ProviderError {
    fn from(e: ContractError) -> Self {
        ProviderError::SchemaMismatch(e.to_string())
    }
}

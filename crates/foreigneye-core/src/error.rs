//! Error types for ForeignEye

use thiserror::Error;

/// Result type alias using ForeignEye's Error
pub type Result<T> = std::result::Result<T, Error>;

/// ForeignEye error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (E001-E099)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Lookup errors (E100-E199)
    #[error("Article '{0}' not found.")]
    ArticleNotFound(String),

    #[error("Concept '{0}' not found. Run `foreigneye search <name>` to look concepts up.")]
    ConceptNotFound(String),

    #[error("User '{0}' not found. Run `foreigneye seed-user` to create it.")]
    UserNotFound(String),

    // Idempotent no-ops (E200-E299)
    #[error("Already exists: {0}")]
    DuplicateEntry(String),

    // Extraction errors (E300-E399)
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `foreigneye config get llm.api_key`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("No suitable model: {0}")]
    NoSuitableModel(String),

    // Store-of-record errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    // Graph view errors (E500-E599)
    #[error("Graph store error: {0}")]
    GraphStoreError(String),

    #[error("Graph view sync failed: {0}")]
    ViewSyncFailed(String),

    // Job errors (E600-E699)
    #[error("Job {0} failed: {1}")]
    JobFailed(i64, String),

    // Config errors (E700-E799)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "E001",
            Self::ArticleNotFound(_) => "E100",
            Self::ConceptNotFound(_) => "E101",
            Self::UserNotFound(_) => "E102",
            Self::DuplicateEntry(_) => "E200",
            Self::ExtractionFailed(_) => "E300",
            Self::NetworkError(_) => "E301",
            Self::LLMError(_) => "E302",
            Self::RateLimited(_) => "E303",
            Self::NoSuitableModel(_) => "E304",
            Self::DatabaseError(_) => "E400",
            Self::StoreWriteFailed(_) => "E401",
            Self::GraphStoreError(_) => "E500",
            Self::ViewSyncFailed(_) => "E501",
            Self::JobFailed(..) => "E600",
            Self::ConfigError(_) => "E700",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ConceptNotFound(_) => Some("foreigneye search <name>".to_string()),
            Self::UserNotFound(_) => Some("foreigneye seed-user".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("foreigneye config get llm.api_key".to_string()),
            Self::GraphStoreError(_) | Self::ViewSyncFailed(_) => {
                Some("foreigneye doctor".to_string())
            }
            Self::ConfigError(_) => Some("foreigneye config list".to_string()),
            _ => None,
        }
    }

    /// True for the idempotent "nothing changed" outcome.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateEntry(_))
    }

    /// True for errors that describe a caller mistake rather than a system fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::ArticleNotFound(_)
                | Self::ConceptNotFound(_)
                | Self::UserNotFound(_)
                | Self::DuplicateEntry(_)
        )
    }
}

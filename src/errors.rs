//! Unified error type for the portal core, the storage backends and the bot layer.

use crate::core::money::Euro;
use thiserror::Error;

/// Every failure the portal can surface.
///
/// The variants follow the error kinds a request can end in: `Authz`, `Validation` and
/// `Precondition` are shown to the user, `NotFound` maps to a 404, and everything else
/// aborts the request.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file or environment could not be read
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// A document, event, programm item or attendee does not exist
    #[error("{table} {id} not found")]
    NotFound {
        /// Table or kind of thing that was looked up
        table: String,
        /// The id that was looked up
        id: String,
    },

    /// The caller lacks permission for the operation
    #[error("Not allowed: {message}")]
    Authz {
        /// Explanation shown to the user
        message: String,
    },

    /// Invalid or inconsistent user input
    #[error("Invalid input: {message}")]
    Validation {
        /// Explanation shown next to the offending field
        message: String,
    },

    /// The operation is denied by a domain invariant
    #[error("{message}")]
    Precondition {
        /// Explanation shown to the user
        message: String,
    },

    /// A debit would overdraw a ledger that is not allowed to go negative
    #[error("Insufficient balance: {balance} available, {required} required")]
    InsufficientFunds {
        /// Balance before the debit
        balance: Euro,
        /// Amount that was requested
        required: Euro,
    },

    /// The KV command or the chat bridge failed
    #[error("External service error: {message}")]
    External {
        /// Description including the command output, if any
        message: String,
    },

    /// `SeaORM` error from the database backend
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem error from the files backend or process spawning
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document did not match its expected shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Environment variable missing
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Serenity/Poise framework error
    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

impl Error {
    /// Shorthand for a [`Error::Precondition`] with the given message.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Shorthand for an [`Error::Authz`] with the given message.
    pub fn authz(message: impl Into<String>) -> Self {
        Self::Authz {
            message: message.into(),
        }
    }

    /// Shorthand for an [`Error::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for an [`Error::NotFound`].
    pub fn not_found(table: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            table: table.into(),
            id: id.to_string(),
        }
    }

    /// Whether this error means the looked-up thing does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error should be shown to the user instead of aborting the request.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Authz { .. }
                | Self::Validation { .. }
                | Self::Precondition { .. }
                | Self::InsufficientFunds { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

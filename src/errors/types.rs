//! Error type definitions for the TV data synchronizer
//!
//! This module defines the error hierarchy used throughout the crate. Each
//! layer has its own enum and the top-level [`AppError`] wraps them all.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Remote source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Binary or text payload errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Underlying driver failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// SQL query execution failures
    #[error("Query failed: {query} - {message}")]
    QueryFailed { query: String, message: String },

    /// Record not found
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound {
        table: String,
        field: String,
        value: String,
    },

    /// Migration failures
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed { version: String, message: String },
}

/// Errors raised while talking to mirrors and the transfer layer
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    /// Request did not complete in time
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Non-success HTTP status
    #[error("HTTP error: {status} for {url}")]
    Http { status: u16, url: String },

    /// Connection refused, DNS failure, broken body stream, ...
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// Invalid URL handed to the transfer layer
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// No mirror of a group answered the probe
    #[error("No reachable mirror for group '{group_key}'")]
    NoReachableMirror { group_key: String },
}

/// Malformed payload errors
///
/// Raised for any short read or inconsistent declared length. The whole
/// payload is rejected; nothing decoded from it is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes remain than a field declares
    #[error("Short read at offset {offset}: needed {needed} bytes, {available} available")]
    ShortRead {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// An integer field is wider than the decoder supports
    #[error("Integer field too wide: {width} bytes (tag {tag:#04x})")]
    IntegerTooWide { tag: u8, width: usize },

    /// A program frame carries no start time
    #[error("Frame {frame_slot} has no start time")]
    MissingStartTime { frame_slot: u8 },

    /// A channel names a time zone chrono-tz does not know
    #[error("Unknown time zone: {name}")]
    InvalidTimeZone { name: String },

    /// A local time could not be mapped onto the time line
    #[error("Invalid local time: {message}")]
    InvalidLocalTime { message: String },

    /// A catalog line does not have the expected shape
    #[error("Invalid catalog line ({catalog}): {message}")]
    InvalidCatalogLine { catalog: String, message: String },

    /// Inflating a compressed body failed
    #[error("Decompression failed: {message}")]
    Decompression { message: String },
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl RepositoryError {
    /// Create a query failed error
    pub fn query_failed<Q: Into<String>, M: Into<String>>(query: Q, message: M) -> Self {
        Self::QueryFailed {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create a record not found error
    pub fn record_not_found<T: Into<String>, F: Into<String>, V: Into<String>>(
        table: T,
        field: F,
        value: V,
    ) -> Self {
        Self::RecordNotFound {
            table: table.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}

impl SourceError {
    /// Create a timeout error
    pub fn timeout<U: Into<String>>(url: U) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Create a network error
    pub fn network<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Map a reqwest failure onto the source taxonomy
    pub fn from_reqwest<U: Into<String>>(url: U, err: &reqwest::Error) -> Self {
        let url = url.into();
        if err.is_timeout() {
            Self::Timeout { url }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                url,
            }
        } else {
            Self::Network {
                url,
                message: err.to_string(),
            }
        }
    }
}

impl DecodeError {
    /// Create a catalog line error
    pub fn catalog<C: Into<String>, M: Into<String>>(catalog: C, message: M) -> Self {
        Self::InvalidCatalogLine {
            catalog: catalog.into(),
            message: message.into(),
        }
    }
}

//! Centralized error handling for the TV data synchronizer
//!
//! Every failure in the sync pipeline is scoped to one group, channel or
//! day file. The categories map onto how the orchestrator reacts:
//!
//! - **Decode errors**: short reads, inconsistent lengths, unparsable text
//!   fields. The affected file or line is dropped and the cycle continues.
//! - **Source errors**: mirror probes and downloads that fail. The affected
//!   group or channel is skipped until the next cycle.
//! - **Repository errors**: store failures, surfaced to the caller of the
//!   reconciliation step.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;

/// Convenience type alias for Decode Results
pub type DecodeResult<T> = Result<T, DecodeError>;

//! Error handling foundation for parley.
//!
//! Each crate defines its own domain-specific error enums in its own error
//! module. Operations that callers may want to annotate return a rootcause
//! `Report` through this alias; trait seams return the plain enums.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
///
/// Each layer adds its own context via `.context()` as errors propagate.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

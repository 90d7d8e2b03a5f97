//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Event signup, guest and calendar commands
pub mod event;

/// General utility commands
pub mod general;

/// Ledger commands
pub mod ledger;

// Export commands
pub use event::*;
pub use general::*;
pub use ledger::*;

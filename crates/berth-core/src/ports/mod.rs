//! Host port conflicts: detection, allocation and post-pass optimization.
//!
//! ```text
//! manifest + bound ports ──► detect ──► [PortConflict]
//!                                             │
//!                 PortLedger (exclusion set) ─┤
//!                                             ▼
//!                                  resolve (strategy) ──► optimize ──► [PortResolution]
//! ```

pub mod detect;
pub mod ledger;
pub mod optimize;
pub mod resolve;

pub use detect::detect_port_conflicts;
pub use ledger::PortLedger;
pub use optimize::optimize_resolutions;
pub use resolve::{PortOutcome, PortSuggestion, resolve_port_conflicts, suggest_alternatives};

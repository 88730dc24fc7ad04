//! Container network conflicts: detection, subnet allocation and static IP
//! remapping.
//!
//! The [`SubnetLedger`] seeded from the network probe is shared by detection
//! and allocation, so a subnet chosen for one network is never offered to
//! another in the same run.

pub mod allocate;
pub mod detect;
pub mod ledger;
pub mod remap;

pub use allocate::{SubnetOutcome, allocate_subnets};
pub use detect::detect_network_conflicts;
pub use ledger::SubnetLedger;
pub use remap::{remap_ip, remap_service_ips};

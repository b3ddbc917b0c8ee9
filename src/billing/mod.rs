//! Credit packages and payment provider payloads.

pub mod lava;
pub mod packages;

pub use lava::LavaEvent;
pub use packages::{find_package, require_package, CreditPackage, PACKAGES};

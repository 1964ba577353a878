//! ngo-portal/crates/np-core/src/lib.rs
//!
//! Domain records and the port traits shared by the portal's crates.

pub mod error;
pub mod form;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use form::FormFields;
pub use models::*;
pub use traits::*;

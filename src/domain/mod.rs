//! Domain models - core business types
//!
//! - `types` - coordinates, place names, punch events, session identity
//! - `record` - field extraction over loosely-typed upstream records
//! - `party` - customer/stock rows from the accounting backend

pub mod party;
pub mod record;
pub mod types;

pub use types::{Coordinates, Direction, Permission, PlaceName, PunchEvent, SessionIdentity};

//! Services - location resolution and the punch workflow
//!
//! - `geocoder` - Ordered reverse geocode cascade with coordinate fallback
//! - `resolver` - Location resolver lifecycle and published snapshots
//! - `punch` - Duty status, punch validation and dispatch
//! - `identity` - Persisted employee identity and re-auth requests
//! - `session_gate` - Sign-in overlay gate
//! - `sign_in` - Employee sign-in flow

pub mod geocoder;
pub mod identity;
pub mod punch;
pub mod resolver;
pub mod session_gate;
pub mod sign_in;

// Re-export commonly used types
pub use geocoder::ReverseGeocoder;
pub use identity::IdentityStore;
pub use punch::{DutyStatus, PunchSession, ToggleOutcome};
pub use resolver::{LocationResolver, LocationSnapshot, ResolverState};
pub use session_gate::{OverlayState, SessionGate};
pub use sign_in::SignInFlow;

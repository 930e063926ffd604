//! Membership Card Applet
//!
//! The secure element side of the gym membership card: a 64-byte record
//! guarded by a PIN with retry lockout, plus RSA device authentication.

pub mod applet;
pub mod pin_manager;
pub mod session;

pub use applet::{AppletError, MembershipApplet};
pub use pin_manager::{PINManager, PinCheck};
pub use session::Session;

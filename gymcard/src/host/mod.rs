//! Host side of the membership card
//!
//! Everything the operator's terminal does: drive a card over a
//! [`CardTransport`], map status words to typed outcomes, and rebuild a
//! record from a [`BalanceSource`] after an admin PIN reset.

mod client;
mod error;
mod status;
mod sync;
mod transport;

pub use client::CardClient;
pub use error::Error;
pub use status::CardStatus;
pub use sync::{BalanceSource, InMemoryBalanceSource, JsonFileBalanceSource, RemoteCardData, SyncError};
pub use transport::{CardTransport, TransportError};

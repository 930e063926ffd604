//! Card transports
//!
//! Anything that can carry an APDU to a card and bring the response back:
//! the in-process [`VirtualCard`], a [`SharedCard`], or a PC/SC reader.

use std::io;

use thiserror::Error;

use crate::{SharedCard, VirtualCard};

/// The exchange itself failed; says nothing about the card's answer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No card present")]
    NoCard,

    #[error("Card communication failed: {0}")]
    Io(#[from] io::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Half-duplex APDU exchange
pub trait CardTransport {
    /// Send a command APDU, return data ‖ SW1 ‖ SW2
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl CardTransport for VirtualCard {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(self.process_apdu(command))
    }
}

impl CardTransport for SharedCard {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(self.lock().process_apdu(command))
    }
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).transmit(command)
    }
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).transmit(command)
    }
}

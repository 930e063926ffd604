//! Virtual gym membership card
//!
//! A software secure element holding a 64-byte membership record (balance,
//! expiry, PIN hash, retry counter, cardholder details) and an RSA device
//! key, together with the host-side layer that drives it.
//!
//! The card side answers short APDUs:
//! - READ / WRITE the record, with writes gated on PIN verification
//! - VERIFY PIN / CHANGE PIN with a five-attempt retry counter
//! - GET PUBLIC KEY / SIGN CHALLENGE for device authentication
//! - ADMIN UNLOCK / ADMIN RESET PIN for the operator
//!
//! # Example
//! ```no_run
//! use gymcard::card::{CardConfig, CardData, DateOfBirth};
//! use gymcard::crypto::Pin;
//! use gymcard::host::CardClient;
//! use gymcard::VirtualCard;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut card = VirtualCard::new(&CardConfig::default())?;
//! card.power_on();
//!
//! let mut client = CardClient::new(card);
//! client.select_default()?;
//!
//! let pin = Pin::new("123456")?;
//! let member = CardData {
//!     user_id: 1234,
//!     balance: 500_000,
//!     expiry_days: 30,
//!     dob: DateOfBirth::new(1, 1, 2000),
//!     full_name: "Nguyen Van A".into(),
//!     ..CardData::default()
//! };
//! client.provision(&member, &pin)?;
//! assert_eq!(client.verify_pin(&pin)?.balance, 500_000);
//! # Ok(())
//! # }
//! ```

pub mod apdu;
pub mod card;
pub mod crypto;
pub mod host;
pub mod membership;

use std::sync::Arc;

use log::{debug, error, info};
use parking_lot::{Mutex, MutexGuard};

use apdu::{ins, parse_apdu, Response, APDU, SW};
use card::{atr, CardConfig, CardDataStore};
use membership::{AppletError, MembershipApplet};

/// P1 of SELECT by DF name
const SELECT_BY_NAME: u8 = 0x04;

/// The card as a reader sees it: power, reset, applet selection and APDU
/// exchange around the membership applet
pub struct VirtualCard {
    applet: MembershipApplet,
    aid: Vec<u8>,
    atr: Vec<u8>,
    powered: bool,
    selected: bool,
}

impl VirtualCard {
    /// Load (or create) the card persisted under `config.storage_dir`
    ///
    /// A damaged state file is an error; the card never silently comes up
    /// blank in its place.
    pub fn new(config: &CardConfig) -> Result<Self, AppletError> {
        let mut store = CardDataStore::new(Some(config.storage_dir.clone()));
        store.load()?;

        let applet = MembershipApplet::new(store)?
            .require_session_for_change_pin(config.change_pin_requires_session);
        Ok(Self::with_applet(applet, &config.aid))
    }

    /// Wrap an applet answering SELECT for `aid`
    pub fn with_applet(applet: MembershipApplet, aid: &[u8]) -> Self {
        Self {
            applet,
            aid: aid.to_vec(),
            atr: atr::card_atr(aid),
            powered: false,
            selected: false,
        }
    }

    /// Power on the card
    pub fn power_on(&mut self) -> Vec<u8> {
        self.powered = true;
        self.selected = false;
        self.applet.reset();
        info!("Virtual card powered on");
        self.atr.clone()
    }

    /// Power off the card
    pub fn power_off(&mut self) {
        self.powered = false;
        self.selected = false;
        self.applet.reset();
        info!("Virtual card powered off");
    }

    /// Reset the card
    pub fn reset(&mut self) -> Vec<u8> {
        self.applet.reset();
        self.selected = false;
        self.powered = true;
        info!("Virtual card reset");
        self.atr.clone()
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    pub fn applet(&self) -> &MembershipApplet {
        &self.applet
    }

    /// Process an APDU command
    pub fn process_apdu(&mut self, apdu_bytes: &[u8]) -> Vec<u8> {
        if !self.powered {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED).to_bytes();
        }

        let cmd = match parse_apdu(apdu_bytes) {
            Ok(apdu) => apdu,
            Err(e) => {
                error!("Failed to parse APDU: {}", e);
                return Response::error(SW::WRONG_LENGTH).to_bytes();
            }
        };

        debug!(
            "Processing APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Lc={}",
            cmd.cla,
            cmd.ins,
            cmd.p1,
            cmd.p2,
            cmd.data.len()
        );

        let response = if cmd.ins == ins::SELECT {
            self.handle_select(&cmd)
        } else if self.selected {
            self.applet.process_apdu(&cmd)
        } else {
            Response::error(SW::CONDITIONS_NOT_SATISFIED)
        };

        debug!("Response SW={:04X} ({} data bytes)", response.sw(), response.data.len());
        response.to_bytes()
    }

    /// SELECT by AID starts a fresh session
    fn handle_select(&mut self, cmd: &APDU) -> Response {
        if cmd.p1 != SELECT_BY_NAME {
            return Response::error(SW::INCORRECT_P1_P2);
        }

        if cmd.data == self.aid {
            self.selected = true;
            self.applet.reset();
            info!("Selected membership applet");
            return Response::ok();
        }

        debug!("Unknown AID: {:02X?}", cmd.data);
        Response::error(SW::FILE_NOT_FOUND)
    }
}

/// A [`VirtualCard`] shared between threads; commands are serialized
#[derive(Clone)]
pub struct SharedCard(Arc<Mutex<VirtualCard>>);

impl SharedCard {
    pub fn new(card: VirtualCard) -> Self {
        Self(Arc::new(Mutex::new(card)))
    }

    pub fn lock(&self) -> MutexGuard<'_, VirtualCard> {
        self.0.lock()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardState, DEFAULT_AID};
    use crate::testing::test_key_der;

    const SELECT: &[u8] = &[0x00, 0xA4, 0x04, 0x00, 0x06, 0x26, 0x12, 0x20, 0x03, 0x03, 0x00];
    const READ: &[u8] = &[0x00, 0xB0, 0x00, 0x00, 0x40];

    fn create_test_card() -> VirtualCard {
        let store = CardDataStore::in_memory(CardState::with_private_key(test_key_der()));
        VirtualCard::with_applet(MembershipApplet::new(store).unwrap(), DEFAULT_AID)
    }

    fn sw(response: &[u8]) -> u16 {
        let n = response.len();
        ((response[n - 2] as u16) << 8) | response[n - 1] as u16
    }

    #[test]
    fn test_unpowered_card() {
        let mut card = create_test_card();
        assert!(!card.is_powered());
        assert_eq!(sw(&card.process_apdu(SELECT)), SW::CONDITIONS_NOT_SATISFIED);
    }

    #[test]
    fn test_power_on_returns_atr() {
        let mut card = create_test_card();
        let atr = card.power_on();
        assert_eq!(atr[0], 0x3B);
        assert_eq!(atr, card.atr());
    }

    #[test]
    fn test_select_then_read() {
        let mut card = create_test_card();
        card.power_on();

        assert_eq!(sw(&card.process_apdu(READ)), SW::CONDITIONS_NOT_SATISFIED);
        assert_eq!(card.process_apdu(SELECT), vec![0x90, 0x00]);

        let response = card.process_apdu(READ);
        assert_eq!(response.len(), 64 + 2);
        assert_eq!(sw(&response), SW::SUCCESS);
    }

    #[test]
    fn test_select_unknown_aid() {
        let mut card = create_test_card();
        card.power_on();
        let select = [0x00, 0xA4, 0x04, 0x00, 0x03, 0xA0, 0x00, 0x01];
        assert_eq!(sw(&card.process_apdu(&select)), SW::FILE_NOT_FOUND);
    }

    #[test]
    fn test_select_by_file_id_rejected() {
        let mut card = create_test_card();
        card.power_on();
        let select = [0x00, 0xA4, 0x00, 0x0C, 0x02, 0x3F, 0x00];
        assert_eq!(sw(&card.process_apdu(&select)), 0x6A86);

        // Still unselected afterwards
        assert_eq!(sw(&card.process_apdu(READ)), SW::CONDITIONS_NOT_SATISFIED);
    }

    #[test]
    fn test_malformed_apdu() {
        let mut card = create_test_card();
        card.power_on();
        assert_eq!(card.process_apdu(&[0x00, 0xB0]), vec![0x67, 0x00]);
    }

    #[test]
    fn test_power_cycle_ends_session() {
        let mut card = create_test_card();
        card.power_on();
        card.process_apdu(SELECT);
        let verify = [0x00, 0x20, 0x00, 0x00, 0x06, 0x30, 0x30, 0x30, 0x30, 0x30, 0x30, 0x40];
        // Blank card: hash is all zeros, so any PIN is a mismatch
        assert_eq!(sw(&card.process_apdu(&verify)), 0x63C4);

        card.power_off();
        assert_eq!(sw(&card.process_apdu(READ)), SW::CONDITIONS_NOT_SATISFIED);

        card.reset();
        assert_eq!(sw(&card.process_apdu(READ)), SW::CONDITIONS_NOT_SATISFIED);
        card.process_apdu(SELECT);
        let response = card.process_apdu(READ);
        // Retry counter survives the power cycle
        assert_eq!(response[34], 4);
    }

    #[test]
    fn test_shared_card() {
        let shared = SharedCard::new(create_test_card());
        let other = shared.clone();
        shared.lock().power_on();
        assert!(other.lock().is_powered());
    }
}

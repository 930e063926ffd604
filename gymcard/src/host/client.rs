//! Host-side card flows
//!
//! [`CardClient`] turns operator actions (provision, top up, change PIN,
//! authenticate the card, ...) into command sequences over a
//! [`CardTransport`] and decodes what comes back.

use log::{debug, info, warn};
use rsa::RsaPublicKey;

use super::error::Error;
use super::status::CardStatus;
use super::sync::BalanceSource;
use super::transport::CardTransport;
use crate::apdu::{ins, CardCommand, Response, APDU};
use crate::card::record::{CardData, RawRecord, MAX_PIN_RETRY, RECORD_SIZE};
use crate::card::DEFAULT_AID;
use crate::crypto::{random_challenge, Pin, RsaOperations, CHALLENGE_LENGTH};

/// Drives a membership card over a transport
pub struct CardClient<T> {
    transport: T,
}

impl<T: CardTransport> CardClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send an APDU and split the answer; only transport and framing
    /// problems are errors here
    pub fn transmit(&mut self, apdu: &APDU) -> Result<Response, Error> {
        let raw = apdu.to_bytes()?;
        let reply = self.transport.transmit(&raw)?;
        let response = Response::from_bytes(&reply)?;
        debug!(
            "INS={:02X} -> SW={:04X} ({} bytes)",
            apdu.ins,
            response.sw(),
            response.data.len()
        );
        Ok(response)
    }

    /// Send a command and require 9000
    fn execute(&mut self, command: &CardCommand) -> Result<Vec<u8>, Error> {
        let response = self.transmit(&command.to_apdu())?;
        match Error::from_status(CardStatus::from_sw(response.sw())) {
            None => Ok(response.data),
            Some(err) => {
                debug!("{} failed: {}", command.name(), err);
                Err(err)
            }
        }
    }

    fn execute_expecting(&mut self, command: &CardCommand, expected: usize) -> Result<Vec<u8>, Error> {
        let data = self.execute(command)?;
        if data.len() != expected {
            return Err(Error::UnexpectedResponse {
                expected,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    /// SELECT the applet by AID
    pub fn select(&mut self, aid: &[u8]) -> Result<(), Error> {
        let apdu = APDU::new(0x00, ins::SELECT, 0x04, 0x00).with_data(aid.to_vec());
        let response = self.transmit(&apdu)?;
        match Error::from_status(CardStatus::from_sw(response.sw())) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    pub fn select_default(&mut self) -> Result<(), Error> {
        self.select(DEFAULT_AID)
    }

    /// The stored record, sensitive block still encrypted
    pub fn read_raw(&mut self) -> Result<RawRecord, Error> {
        let data = self.execute_expecting(&CardCommand::Read, RECORD_SIZE)?;
        Ok(RawRecord::from_bytes(&data)?)
    }

    /// Plaintext fields only; balance and expiry are -1
    pub fn read_public(&mut self) -> Result<CardData, Error> {
        let record = self.read_raw()?;
        Ok(CardData::decode_plaintext_only(record.as_bytes())?)
    }

    /// Read and decrypt locally with `pin`
    ///
    /// Costs no PIN attempt, and a wrong PIN yields garbage numbers rather
    /// than an error. Use [`verify_pin`](Self::verify_pin) to have the card
    /// check the PIN.
    pub fn read_with_pin(&mut self, pin: &Pin) -> Result<CardData, Error> {
        let record = self.read_raw()?;
        Ok(CardData::decode_encrypted(record.as_bytes(), pin.as_bytes())?)
    }

    /// Have the card check the PIN; on success the card's response carries
    /// the decrypted balance and expiry
    pub fn verify_pin(&mut self, pin: &Pin) -> Result<CardData, Error> {
        let data = self.execute_expecting(&CardCommand::VerifyPin(*pin.as_bytes()), RECORD_SIZE)?;
        Ok(CardData::decode_already_decrypted(&data)?)
    }

    pub fn write_record(&mut self, record: &RawRecord) -> Result<(), Error> {
        self.execute(&CardCommand::Write(*record.as_bytes()))?;
        Ok(())
    }

    /// Personalize the card for a member
    ///
    /// A card that already holds a member is erased first. The retry counter
    /// is written full.
    pub fn provision(&mut self, data: &CardData, pin: &Pin) -> Result<(), Error> {
        let current = self.read_raw()?;
        if !current.is_blank() {
            info!("Card holds user {}, erasing before provisioning", current.user_id());
            self.erase()?;
        }

        let data = CardData {
            retry_counter: MAX_PIN_RETRY,
            ..data.clone()
        };
        self.write_record(&data.encode(pin.as_bytes())?)?;
        info!("Provisioned card for user {}", data.user_id);
        Ok(())
    }

    /// Blank the card: UserID 0, default PIN, full retry counter
    pub fn erase(&mut self) -> Result<(), Error> {
        let blank = CardData::default().encode(Pin::default_pin().as_bytes())?;
        self.write_record(&blank)?;
        info!("Card erased");
        Ok(())
    }

    /// Add `amount` to the balance
    pub fn top_up(&mut self, pin: &Pin, amount: i32) -> Result<CardData, Error> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        self.update_balance(pin, |balance| {
            balance.checked_add(amount).ok_or(Error::BalanceOverflow)
        })
    }

    /// Deduct `amount` from the balance
    pub fn purchase(&mut self, pin: &Pin, amount: i32) -> Result<CardData, Error> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        self.update_balance(pin, |balance| {
            if balance < amount {
                Err(Error::InsufficientBalance { balance, amount })
            } else {
                Ok(balance - amount)
            }
        })
    }

    fn update_balance<F>(&mut self, pin: &Pin, update: F) -> Result<CardData, Error>
    where
        F: FnOnce(i32) -> Result<i32, Error>,
    {
        let mut data = self.verify_pin(pin)?;
        if data.user_id == 0 {
            return Err(Error::NotProvisioned);
        }

        data.balance = update(data.balance)?;
        self.write_record(&data.encode(pin.as_bytes())?)?;
        info!("Balance updated for user {}", data.user_id);
        Ok(data)
    }

    /// Verify `old`, then have the card re-key to `new`
    pub fn change_pin(&mut self, old: &Pin, new: &Pin) -> Result<(), Error> {
        self.verify_pin(old)?;
        self.execute(&CardCommand::ChangePin {
            old: *old.as_bytes(),
            new: *new.as_bytes(),
        })?;
        info!("PIN changed");
        Ok(())
    }

    pub fn admin_unlock(&mut self) -> Result<(), Error> {
        self.execute(&CardCommand::AdminUnlock)?;
        info!("Card unlocked");
        Ok(())
    }

    /// Set a new PIN without the old one
    ///
    /// The balance and expiry stay encrypted under the old PIN and read as
    /// garbage until [`reprovision`](Self::reprovision) rewrites them.
    pub fn admin_reset_pin(&mut self, new: &Pin) -> Result<(), Error> {
        self.execute(&CardCommand::AdminResetPin(*new.as_bytes()))?;
        warn!("PIN reset by admin; card needs re-provisioning");
        Ok(())
    }

    /// Rebuild the record from the balance source after an admin PIN reset
    pub fn reprovision<S>(&mut self, source: &S, pin: &Pin) -> Result<CardData, Error>
    where
        S: BalanceSource + ?Sized,
    {
        let current = self.read_public()?;
        if current.user_id == 0 {
            return Err(Error::NotProvisioned);
        }

        let remote = source.fetch(current.user_id)?;
        let card = self.verify_pin(pin)?;

        let data = CardData {
            balance: remote.balance,
            expiry_days: remote.expiry_days,
            full_name: remote.full_name,
            retry_counter: MAX_PIN_RETRY,
            ..card
        };
        self.write_record(&data.encode(pin.as_bytes())?)?;
        info!("Re-provisioned user {} from balance records", data.user_id);
        Ok(data)
    }

    pub fn get_public_key(&mut self) -> Result<RsaPublicKey, Error> {
        let data = self.execute_expecting(&CardCommand::GetPublicKey, RsaOperations::PUBLIC_KEY_SIZE)?;
        Ok(RsaOperations::parse_public_key(&data)?)
    }

    pub fn sign_challenge(&mut self, challenge: &[u8; CHALLENGE_LENGTH]) -> Result<Vec<u8>, Error> {
        self.execute_expecting(
            &CardCommand::SignChallenge(*challenge),
            RsaOperations::SIGNATURE_SIZE,
        )
    }

    /// Challenge-response check that the card holds the private key for
    /// `public_key`
    pub fn authenticate_with(&mut self, public_key: &RsaPublicKey) -> Result<(), Error> {
        let challenge = random_challenge();
        let signature = self.sign_challenge(&challenge)?;
        if RsaOperations::verify_signature(&challenge, &signature, public_key) {
            info!("Card authenticated");
            Ok(())
        } else {
            warn!("Card signature did not verify");
            Err(Error::AuthenticationFailed)
        }
    }

    /// Fetch the card's public key and run the challenge-response against it
    pub fn authenticate_card(&mut self) -> Result<RsaPublicKey, Error> {
        let public_key = self.get_public_key()?;
        self.authenticate_with(&public_key)?;
        Ok(public_key)
    }
}

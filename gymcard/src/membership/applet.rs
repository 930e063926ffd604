//! Membership Applet implementation
//!
//! The card-side command dispatcher. Owns the stored record, the device key
//! and the session, and answers every command with a [`Response`].
//!
//! Every command that changes the record is saved before it is answered. If
//! the save fails the record is rolled back, the session is dropped and the
//! card answers 6F00, so memory and storage never disagree.

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::apdu::{CardCommand, Response, APDU, SW};
use crate::card::record::{RawRecord, RecordError, ENCRYPTED_SIZE, MAX_PIN_RETRY, RECORD_SIZE};
use crate::card::{CardDataStore, StoreError};
use crate::crypto::{
    AesError, AesOperations, ChallengeSigner, HashOperations, RsaError, RsaSha1Signer,
    CHALLENGE_LENGTH, PIN_LENGTH,
};
use super::pin_manager::{PINManager, PinCheck};
use super::session::Session;

/// Why the applet could not be brought up from its stored state
#[derive(Debug, Error)]
pub enum AppletError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Stored record is unusable: {0}")]
    Record(#[from] RecordError),

    #[error(transparent)]
    Rsa(#[from] RsaError),
}

/// Membership Card Applet
pub struct MembershipApplet {
    store: CardDataStore,
    record: RawRecord,
    signer: Box<dyn ChallengeSigner>,
    session: Session,
    change_pin_requires_session: bool,
}

impl MembershipApplet {
    /// Create the applet from persisted state
    ///
    /// The device key is generated on first use and must be saved before the
    /// applet comes up.
    pub fn new(mut store: CardDataStore) -> Result<Self, AppletError> {
        let signer = if store.state.has_private_key() {
            RsaSha1Signer::from_pkcs1_der(&store.state.private_key)?
        } else {
            info!("No device key on card, generating one");
            let signer = RsaSha1Signer::generate()?;
            store.state.private_key = signer.to_pkcs1_der()?;
            store.save()?;
            signer
        };

        Self::with_signer(store, Box::new(signer))
    }

    /// Create the applet with a caller-supplied signer
    pub fn with_signer(
        store: CardDataStore,
        signer: Box<dyn ChallengeSigner>,
    ) -> Result<Self, AppletError> {
        let mut record = store.state.raw_record()?;
        if record.retry_counter() > MAX_PIN_RETRY {
            warn!(
                "Stored retry counter {} out of range, clamping to {}",
                record.retry_counter(),
                MAX_PIN_RETRY
            );
            record.set_retry_counter(MAX_PIN_RETRY);
        }

        let mut session = Session::new();
        session.sync_with_retry_counter(record.retry_counter());

        Ok(Self {
            store,
            record,
            signer,
            session,
            change_pin_requires_session: false,
        })
    }

    /// Answer CHANGE PIN with 6982 unless a PIN was verified this session
    pub fn require_session_for_change_pin(mut self, required: bool) -> Self {
        self.change_pin_requires_session = required;
        self
    }

    pub fn record(&self) -> &RawRecord {
        &self.record
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Forget the session (deselect, reset or power loss)
    pub fn reset(&mut self) {
        self.session.clear();
        self.session.sync_with_retry_counter(self.record.retry_counter());
    }

    /// Process an APDU command and return the response
    pub fn process_apdu(&mut self, cmd: &APDU) -> Response {
        match CardCommand::from_apdu(cmd) {
            Ok(command) => self.process(command),
            Err(sw) => {
                debug!("Rejected INS={:02X} with {:04X}", cmd.ins, sw);
                Response::error(sw)
            }
        }
    }

    /// Execute a decoded command
    pub fn process(&mut self, command: CardCommand) -> Response {
        debug!("{:?} in session {}", command, self.session_name());

        match command {
            CardCommand::Read => self.handle_read(),
            CardCommand::Write(record) => self.handle_write(record),
            CardCommand::VerifyPin(pin) => self.handle_verify_pin(&pin),
            CardCommand::ChangePin { old, new } => self.handle_change_pin(&old, &new),
            CardCommand::GetPublicKey => self.handle_get_public_key(),
            CardCommand::SignChallenge(challenge) => self.handle_sign_challenge(&challenge),
            CardCommand::AdminUnlock => self.handle_admin_unlock(),
            CardCommand::AdminResetPin(pin) => self.handle_admin_reset_pin(&pin),
        }
    }

    fn session_name(&self) -> &'static str {
        match self.session {
            Session::Idle => "idle",
            Session::Authenticated(_) => "authenticated",
            Session::Locked => "locked",
        }
    }

    // =========================================================================
    // Command Handlers
    // =========================================================================

    fn handle_read(&self) -> Response {
        Response::success(self.record.as_bytes().to_vec())
    }

    /// Blank cards, authenticated sessions and erasures (incoming UserID 0)
    /// may write; everything else gets 6982
    fn handle_write(&mut self, incoming: [u8; RECORD_SIZE]) -> Response {
        let mut record = RawRecord::from(incoming);

        if !self.record.is_blank() && !self.session.is_authenticated() && !record.is_blank() {
            debug!("WRITE refused: card is provisioned and no PIN verified");
            return Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
        }

        if record.retry_counter() > MAX_PIN_RETRY {
            record.set_retry_counter(MAX_PIN_RETRY);
        }

        let previous = std::mem::replace(&mut self.record, record);
        if let Err(failed) = self.commit(previous) {
            return failed;
        }

        self.session.clear();
        self.session.sync_with_retry_counter(self.record.retry_counter());
        info!("Record written for user {}", self.record.user_id());
        Response::ok()
    }

    fn handle_verify_pin(&mut self, pin: &[u8; PIN_LENGTH]) -> Response {
        let previous = self.record.clone();

        match PINManager::check(&mut self.record, pin) {
            PinCheck::Blocked => {
                warn!("VERIFY on a locked card");
                Response::error(SW::AUTH_METHOD_BLOCKED)
            }
            PinCheck::Mismatch { retries_left } => {
                // The decrement is on disk before the card says so
                if let Err(failed) = self.commit(previous) {
                    return failed;
                }
                self.session.clear();
                self.session.sync_with_retry_counter(retries_left);
                if retries_left == 0 {
                    warn!("PIN retry counter exhausted, card locked");
                }
                Response::counter_warning(retries_left)
            }
            PinCheck::Verified => {
                PINManager::reset_retries(&mut self.record);
                let key = HashOperations::derive_key(pin);

                let plaintext = match AesOperations::decrypt_raw_block(
                    key.as_bytes(),
                    self.record.encrypted_block(),
                ) {
                    Ok(plaintext) => plaintext,
                    Err(e) => {
                        warn!("Decrypting the sensitive block failed: {}", e);
                        self.record = previous;
                        return Response::error(SW::UNKNOWN_ERROR);
                    }
                };

                // Saved even when the counter was already full, so a
                // failing store answers 6F00 for right and wrong PINs alike
                if let Err(failed) = self.commit(previous) {
                    return failed;
                }

                // Only the response carries plaintext; storage stays encrypted
                let mut response = self.record.clone();
                response.set_encrypted_block(&plaintext);

                self.session.authenticate(key);
                info!("PIN verified for user {}", self.record.user_id());
                Response::success(response.as_bytes().to_vec())
            }
        }
    }

    fn handle_change_pin(&mut self, old: &[u8; PIN_LENGTH], new: &[u8; PIN_LENGTH]) -> Response {
        if self.change_pin_requires_session && !self.session.is_authenticated() {
            return Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
        }

        let previous = self.record.clone();

        match PINManager::check(&mut self.record, old) {
            PinCheck::Blocked => Response::error(SW::AUTH_METHOD_BLOCKED),
            PinCheck::Mismatch { retries_left } => {
                if let Err(failed) = self.commit(previous) {
                    return failed;
                }
                self.session.clear();
                self.session.sync_with_retry_counter(retries_left);
                Response::counter_warning(retries_left)
            }
            PinCheck::Verified => {
                let old_key = HashOperations::derive_key(old);
                let new_key = HashOperations::derive_key(new);

                let block = match Self::reencrypt(
                    self.record.encrypted_block(),
                    old_key.as_bytes(),
                    new_key.as_bytes(),
                ) {
                    Ok(block) => block,
                    Err(e) => {
                        warn!("Re-encrypting the sensitive block failed: {}", e);
                        self.record = previous;
                        return Response::error(SW::UNKNOWN_ERROR);
                    }
                };
                self.record.set_encrypted_block(&block);
                PINManager::set_pin(&mut self.record, new);

                if let Err(failed) = self.commit(previous) {
                    return failed;
                }

                if self.session.is_authenticated() {
                    self.session.authenticate(new_key);
                }
                info!("PIN changed for user {}", self.record.user_id());
                Response::ok()
            }
        }
    }

    fn reencrypt(
        block: &[u8],
        old_key: &[u8],
        new_key: &[u8],
    ) -> Result<[u8; ENCRYPTED_SIZE], AesError> {
        let plaintext = AesOperations::decrypt_raw_block(old_key, block)?;
        AesOperations::encrypt_raw_block(new_key, &plaintext)
    }

    fn handle_get_public_key(&self) -> Response {
        match self.signer.public_key_bytes() {
            Ok(key) => Response::success(key),
            Err(e) => {
                warn!("Exporting the device key failed: {}", e);
                Response::error(SW::UNKNOWN_ERROR)
            }
        }
    }

    fn handle_sign_challenge(&self, challenge: &[u8; CHALLENGE_LENGTH]) -> Response {
        match self.signer.sign(challenge) {
            Ok(signature) => Response::success(signature),
            Err(e) => {
                warn!("Signing the challenge failed: {}", e);
                Response::error(SW::UNKNOWN_ERROR)
            }
        }
    }

    /// Restores the counter; does not authenticate
    fn handle_admin_unlock(&mut self) -> Response {
        let previous = self.record.clone();
        PINManager::reset_retries(&mut self.record);
        if let Err(failed) = self.commit(previous) {
            return failed;
        }

        self.session.sync_with_retry_counter(self.record.retry_counter());
        info!("Retry counter restored by admin");
        Response::ok()
    }

    /// The sensitive block stays encrypted under the old PIN's key, so the
    /// card has to be re-provisioned afterwards
    fn handle_admin_reset_pin(&mut self, pin: &[u8; PIN_LENGTH]) -> Response {
        let previous = self.record.clone();
        PINManager::set_pin(&mut self.record, pin);
        PINManager::reset_retries(&mut self.record);
        if let Err(failed) = self.commit(previous) {
            return failed;
        }

        self.session.clear();
        self.session.sync_with_retry_counter(self.record.retry_counter());
        info!("PIN reset by admin for user {}", self.record.user_id());
        Response::ok()
    }

    /// Save `self.record`; on failure put `previous` back, drop the session
    /// and hand back the 6F00 answer
    fn commit(&mut self, previous: RawRecord) -> Result<(), Response> {
        self.store.state.set_record(&self.record);
        match self.store.save() {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Card state not saved, command rolled back: {}", e);
                self.record = previous;
                self.store.state.set_record(&self.record);
                self.session.clear();
                self.session.sync_with_retry_counter(self.record.retry_counter());
                Err(Response::error(SW::UNKNOWN_ERROR))
            }
        }
    }
}

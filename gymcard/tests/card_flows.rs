//! End-to-end flows: a host client driving a virtual card through raw APDUs

use once_cell::sync::Lazy;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha1::Sha1;
use tempfile::TempDir;

use gymcard::apdu::{CardCommand, SW};
use gymcard::card::{CardConfig, CardData, CardDataStore, CardState, DateOfBirth, RawRecord, DEFAULT_AID};
use gymcard::crypto::{AesOperations, HashOperations, Pin, RsaOperations};
use gymcard::host::{
    BalanceSource, CardClient, CardTransport, Error, JsonFileBalanceSource, RemoteCardData,
    TransportError,
};
use gymcard::membership::MembershipApplet;
use gymcard::{SharedCard, VirtualCard};

static DEVICE_KEY: Lazy<Vec<u8>> = Lazy::new(|| {
    let key = RsaOperations::generate_private_key().unwrap();
    RsaOperations::private_key_to_der(&key).unwrap()
});

fn new_card() -> VirtualCard {
    let store = CardDataStore::in_memory(CardState::with_private_key(DEVICE_KEY.clone()));
    let mut card = VirtualCard::with_applet(MembershipApplet::new(store).unwrap(), DEFAULT_AID);
    card.power_on();
    card
}

fn connect<T: CardTransport>(transport: T) -> CardClient<T> {
    let mut client = CardClient::new(transport);
    client.select_default().unwrap();
    client
}

fn member() -> CardData {
    CardData {
        user_id: 1234,
        balance: 500_000,
        expiry_days: 30,
        retry_counter: 5,
        dob: DateOfBirth::new(1, 1, 2000),
        full_name: "Nguyen Van A".to_string(),
    }
}

fn pin(s: &str) -> Pin {
    Pin::new(s).unwrap()
}

fn sw(response: &[u8]) -> u16 {
    let n = response.len();
    u16::from_be_bytes([response[n - 2], response[n - 1]])
}

#[test]
fn test_record_layout_on_the_wire() {
    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();

    let raw = client.read_raw().unwrap();
    let bytes = raw.as_bytes();
    assert_eq!(&bytes[0..2], &[0x04, 0xD2]);
    assert_eq!(hex::encode(&bytes[18..34]), "8d969eef6ecad3c29a3a629280e686cf");
    assert_eq!(bytes[34], 5);
    assert_eq!(&bytes[35..39], &[1, 1, 0x07, 0xD0]);
    assert_eq!(&bytes[39..51], b"Nguyen Van A");
    assert!(bytes[51..].iter().all(|&b| b == 0));

    let key = HashOperations::derive_key(b"123456");
    let plain = AesOperations::decrypt_raw_block(key.as_bytes(), &bytes[2..18]).unwrap();
    assert_eq!(hex::encode(plain), "0007a120001e00000000000000000000");

    // VERIFY hands the same record back with the block already decrypted
    let apdu = CardCommand::VerifyPin(*b"123456").to_apdu().to_bytes().unwrap();
    let response = client.transport_mut().process_apdu(&apdu);
    assert_eq!(sw(&response), SW::SUCCESS);
    assert_eq!(&response[2..18], &plain);
    assert_eq!(&response[18..64], &bytes[18..64]);

    // Stored block is untouched by VERIFY
    assert_eq!(client.read_raw().unwrap(), raw);
}

#[test]
fn test_lockout_and_admin_unlock() {
    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();

    for expected in (0..5).rev() {
        match client.verify_pin(&pin("111111")) {
            Err(Error::WrongPin { retries_left }) => assert_eq!(retries_left, expected),
            other => panic!("unexpected {:?}", other.map(|d| d.user_id)),
        }
    }

    assert!(client.read_public().unwrap().is_locked());
    assert!(matches!(client.verify_pin(&pin("123456")), Err(Error::CardLocked)));
    assert!(matches!(client.verify_pin(&pin("111111")), Err(Error::CardLocked)));

    client.admin_unlock().unwrap();
    let data = client.verify_pin(&pin("123456")).unwrap();
    assert_eq!(data.balance, 500_000);
    assert_eq!(data.retry_counter, 5);
}

#[test]
fn test_successful_verify_restores_counter() {
    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();

    client.verify_pin(&pin("000001")).unwrap_err();
    client.verify_pin(&pin("000002")).unwrap_err();
    assert_eq!(client.read_public().unwrap().retry_counter, 3);

    client.verify_pin(&pin("123456")).unwrap();
    assert_eq!(client.read_public().unwrap().retry_counter, 5);
}

#[test]
fn test_write_needs_verified_pin() {
    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();

    let forged = CardData {
        balance: 9_999_999,
        ..member()
    }
    .encode(b"123456")
    .unwrap();
    assert!(matches!(client.write_record(&forged), Err(Error::SecurityNotSatisfied)));

    // A failed VERIFY ends the session
    client.verify_pin(&pin("123456")).unwrap();
    client.verify_pin(&pin("999999")).unwrap_err();
    assert!(matches!(client.write_record(&forged), Err(Error::SecurityNotSatisfied)));

    client.verify_pin(&pin("123456")).unwrap();
    client.write_record(&forged).unwrap();
    assert_eq!(client.verify_pin(&pin("123456")).unwrap().balance, 9_999_999);

    // Erasing is always allowed
    client.write_record(&RawRecord::blank()).unwrap();
    assert_eq!(client.read_public().unwrap().user_id, 0);
}

#[test]
fn test_session_ends_on_reselect_and_power_cycle() {
    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();
    let record = member().encode(b"123456").unwrap();

    client.verify_pin(&pin("123456")).unwrap();
    client.select_default().unwrap();
    assert!(matches!(client.write_record(&record), Err(Error::SecurityNotSatisfied)));

    client.verify_pin(&pin("123456")).unwrap();
    client.transport_mut().power_off();
    client.transport_mut().power_on();
    client.select_default().unwrap();
    assert!(matches!(client.write_record(&record), Err(Error::SecurityNotSatisfied)));
}

#[test]
fn test_change_pin_keeps_balance() {
    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();
    client.top_up(&pin("123456"), 1_000).unwrap();

    client.change_pin(&pin("123456"), &pin("246810")).unwrap();
    assert!(matches!(client.verify_pin(&pin("123456")), Err(Error::WrongPin { retries_left: 4 })));

    let data = client.verify_pin(&pin("246810")).unwrap();
    assert_eq!(data.balance, 501_000);
    assert_eq!(data.expiry_days, 30);
}

#[test]
fn test_change_pin_with_wrong_old_pin() {
    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();

    let apdu = CardCommand::ChangePin {
        old: *b"654321",
        new: *b"000000",
    }
    .to_apdu();
    let response = client.transmit(&apdu).unwrap();
    assert_eq!(response.sw(), 0x63C4);
    assert!(client.verify_pin(&pin("123456")).is_ok());
}

#[test]
fn test_admin_reset_and_reprovision_from_file() {
    let dir = TempDir::new().unwrap();
    let mut balances = JsonFileBalanceSource::new(dir.path().join("balances.json"));

    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();
    balances.push(1234, &RemoteCardData::from(&member())).unwrap();

    client.admin_reset_pin(&pin("777777")).unwrap();
    assert!(matches!(client.verify_pin(&pin("123456")), Err(Error::WrongPin { .. })));

    let data = client.reprovision(&balances, &pin("777777")).unwrap();
    assert_eq!(data, member());
    assert_eq!(client.verify_pin(&pin("777777")).unwrap(), member());
}

#[test]
fn test_reprovision_without_remote_record() {
    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();

    let dir = TempDir::new().unwrap();
    let balances = JsonFileBalanceSource::new(dir.path().join("balances.json"));
    let err = client.reprovision(&balances, &pin("123456")).unwrap_err();
    assert!(matches!(err, Error::Sync(_)));
}

#[test]
fn test_signature_verifies_with_spki_key() {
    let mut client = connect(new_card());
    let challenge = [0x5Au8; 32];
    let signature = client.sign_challenge(&challenge).unwrap();
    assert_eq!(signature.len(), 128);

    let der = RsaOperations::public_key_to_der(&client.get_public_key().unwrap()).unwrap();
    let spki = RsaPublicKey::from_public_key_der(&der).unwrap();
    let verifier = VerifyingKey::<Sha1>::new(spki);
    let signature = Signature::try_from(signature.as_slice()).unwrap();
    assert!(verifier.verify(&challenge, &signature).is_ok());
    assert!(verifier.verify(&[0u8; 32], &signature).is_err());
}

#[test]
fn test_authentication_needs_no_pin() {
    let mut client = connect(new_card());
    client.provision(&member(), &pin("123456")).unwrap();
    client.authenticate_card().unwrap();
    assert_eq!(client.read_public().unwrap().retry_counter, 5);
}

/// Drops the next exchange before it reaches the card
struct FlakyTransport {
    card: VirtualCard,
    fail_next: bool,
}

impl CardTransport for FlakyTransport {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(TransportError::Other("reader removed".to_string()));
        }
        self.card.transmit(command)
    }
}

#[test]
fn test_transport_failure_costs_no_attempt() {
    let mut client = connect(FlakyTransport {
        card: new_card(),
        fail_next: false,
    });
    client.provision(&member(), &pin("123456")).unwrap();

    client.transport_mut().fail_next = true;
    let err = client.verify_pin(&pin("123456")).unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(!err.is_pin_failure());

    assert_eq!(client.read_public().unwrap().retry_counter, 5);
}

#[test]
fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = CardConfig::default().with_storage_dir(dir.path());

    let public_key = {
        let mut card = VirtualCard::new(&config).unwrap();
        card.power_on();
        let mut client = connect(card);
        client.provision(&member(), &pin("123456")).unwrap();
        client.verify_pin(&pin("000000")).unwrap_err();
        client.get_public_key().unwrap()
    };
    assert!(dir.path().join("card_state.json").exists());

    let mut card = VirtualCard::new(&config).unwrap();
    card.power_on();
    let mut client = connect(card);
    assert_eq!(client.read_public().unwrap().retry_counter, 4);
    assert_eq!(client.verify_pin(&pin("123456")).unwrap(), member());
    assert_eq!(client.get_public_key().unwrap(), public_key);
}

#[test]
fn test_shared_card_between_threads() {
    let shared = SharedCard::new(new_card());
    connect(shared.clone()).provision(&member(), &pin("123456")).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let card = shared.clone();
            std::thread::spawn(move || {
                let mut client = CardClient::new(card);
                client.read_public().unwrap().user_id
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1234);
    }
}

#[test]
fn test_unsaved_attempt_is_not_counted() {
    let dir = TempDir::new().unwrap();
    let config = CardConfig::default().with_storage_dir(dir.path());
    let tmp = dir.path().join("card_state.json.tmp");

    let mut card = VirtualCard::new(&config).unwrap();
    card.power_on();
    let mut client = connect(card);
    client.provision(&member(), &pin("123456")).unwrap();

    std::fs::create_dir(&tmp).unwrap();
    for _ in 0..5 {
        assert!(matches!(client.verify_pin(&pin("000000")), Err(Error::Status(0x6F00))));
    }
    assert!(matches!(client.verify_pin(&pin("123456")), Err(Error::Status(0x6F00))));
    assert_eq!(client.read_public().unwrap().retry_counter, 5);

    std::fs::remove_dir(&tmp).unwrap();
    assert!(matches!(client.verify_pin(&pin("000000")), Err(Error::WrongPin { retries_left: 4 })));
    drop(client);

    let mut card = VirtualCard::new(&config).unwrap();
    card.power_on();
    assert_eq!(connect(card).read_public().unwrap().retry_counter, 4);
}

#[test]
fn test_damaged_state_file_is_kept() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("card_state.json");
    std::fs::write(&path, "{\"record\": \"AAAA\"").unwrap();

    let config = CardConfig::default().with_storage_dir(dir.path());
    assert!(VirtualCard::new(&config).is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"record\": \"AAAA\"");
}

#[test]
fn test_short_stored_record_is_refused() {
    let state = CardState {
        record: vec![0u8; 10],
        private_key: DEVICE_KEY.clone(),
    };
    assert!(MembershipApplet::new(CardDataStore::in_memory(state)).is_err());
}

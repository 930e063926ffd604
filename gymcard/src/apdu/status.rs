//! Status words the membership card answers with

/// ISO 7816-4 status words used by the card
pub struct SW;

impl SW {
    pub const SUCCESS: u16 = 0x9000;

    /// `63Cn`: PIN rejected, `n` attempts left
    pub const COUNTER_WARNING: u16 = 0x63C0;

    pub const WRONG_LENGTH: u16 = 0x6700;
    /// Provisioned card written without a verified PIN
    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    /// Retry counter is 0
    pub const AUTH_METHOD_BLOCKED: u16 = 0x6983;
    /// Card unpowered or applet not selected
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
    /// SELECT for an AID the card does not hold
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    /// SELECT by anything other than DF name
    pub const INCORRECT_P1_P2: u16 = 0x6A86;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const UNKNOWN_ERROR: u16 = 0x6F00;

    /// `63Cn` for `retries_left`; counts above 15 do not fit the nibble
    pub fn counter_warning(retries_left: u8) -> u16 {
        Self::COUNTER_WARNING | u16::from(retries_left.min(0x0F))
    }

    pub fn is_success(sw: u16) -> bool {
        sw == Self::SUCCESS
    }

    /// Attempts left encoded in a `63Cn` word
    pub fn get_retry_count(sw: u16) -> Option<u8> {
        (sw & 0xFFF0 == Self::COUNTER_WARNING).then_some((sw & 0x000F) as u8)
    }

    /// Same SW1, whatever SW2 says
    pub fn same_class(sw: u16, class: u16) -> bool {
        sw >> 8 == class >> 8
    }
}

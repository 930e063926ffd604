//! ATR (Answer To Reset) handling
//!
//! The virtual card answers power-on and reset with a T=1 ATR whose
//! historical bytes carry the applet AID as a compact-TLV object.

/// Category indicator: compact-TLV objects follow
const CATEGORY_COMPACT_TLV: u8 = 0x80;

/// Compact-TLV tag for an application identifier (high nibble)
const TAG_APPLICATION_ID: u8 = 0xF0;

/// Historical bytes are limited to 15; the category and tag bytes take two
const MAX_AID_IN_ATR: usize = 13;

/// Build an ATR with specific historical bytes
pub fn build_atr(historical_bytes: &[u8]) -> Vec<u8> {
    let mut atr = Vec::with_capacity(20);

    // TS: direct convention
    atr.push(0x3B);

    // T0: TD1 present, K historical bytes (max 15)
    let hist_len = historical_bytes.len().min(15) as u8;
    atr.push(0x80 | hist_len);

    // TD1: T=1, no further interface bytes
    atr.push(0x01);

    atr.extend_from_slice(&historical_bytes[..hist_len as usize]);

    // TCK: XOR of T0 through the last historical byte, required for T=1
    let tck: u8 = atr[1..].iter().fold(0u8, |acc, &b| acc ^ b);
    atr.push(tck);

    atr
}

/// ATR advertising the membership applet
pub fn card_atr(aid: &[u8]) -> Vec<u8> {
    let aid = &aid[..aid.len().min(MAX_AID_IN_ATR)];

    let mut historical = Vec::with_capacity(2 + aid.len());
    historical.push(CATEGORY_COMPACT_TLV);
    historical.push(TAG_APPLICATION_ID | aid.len() as u8);
    historical.extend_from_slice(aid);

    build_atr(&historical)
}

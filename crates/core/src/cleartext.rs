//! Cleartext word encoding shared by the oracle side and the ledger.
//!
//! A decrypted aggregate travels as one 32-byte big-endian word. Values that do
//! not fit in a `u64` are rejected on decode.

pub const WORD_LEN: usize = 32;

/// Encode a score as a 32-byte big-endian word.
pub fn encode_u64_word(value: u64) -> Vec<u8> {
    let mut word = vec![0u8; WORD_LEN];
    word[WORD_LEN - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Decode a 32-byte big-endian word into a `u64`.
///
/// Returns `None` on a wrong length or when any of the high 24 bytes is set.
pub fn decode_u64_word(word: &[u8]) -> Option<u64> {
    if word.len() != WORD_LEN {
        return None;
    }
    let (high, low) = word.split_at(WORD_LEN - 8);
    if high.iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    Some(u64::from_be_bytes(buf))
}

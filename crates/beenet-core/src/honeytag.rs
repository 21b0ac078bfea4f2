//! Pronounceable identity fingerprints
//!
//! A honeytag is the first 32 bits of BLAKE3(BID bytes) rendered as two
//! five-letter consonant-vowel-consonant-vowel-consonant syllables joined
//! by `-`. Each 16-bit half packs as 4-2-4-2-4 bits indexing the fixed
//! consonant and vowel alphabets, so encoding and decoding are exact
//! inverses.

use crate::error::{Error, Result};
use crate::identity::Bid;

/// Consonant alphabet, indexed by 4 bits
pub const CONSONANTS: &[u8; 16] = b"bdfghjklmnprstvz";

/// Vowel alphabet; 2-bit fields index the first four entries
pub const VOWELS: &[u8; 5] = b"aeiou";

/// Compute the honeytag for a BID.
pub fn honeytag(bid: &Bid) -> String {
    let hash = blake3::hash(bid.as_bytes());
    let word = u32::from_be_bytes([
        hash.as_bytes()[0],
        hash.as_bytes()[1],
        hash.as_bytes()[2],
        hash.as_bytes()[3],
    ]);
    encode_honeytag(word)
}

/// Encode a 32-bit word as `xxxxx-xxxxx`.
pub fn encode_honeytag(word: u32) -> String {
    let hi = encode_half((word >> 16) as u16);
    let lo = encode_half(word as u16);
    let mut out = String::with_capacity(11);
    out.push_str(std::str::from_utf8(&hi).unwrap_or("?????"));
    out.push('-');
    out.push_str(std::str::from_utf8(&lo).unwrap_or("?????"));
    out
}

/// Decode a honeytag back to its 32-bit word.
pub fn decode_honeytag(tag: &str) -> Result<u32> {
    let (hi, lo) = tag
        .split_once('-')
        .ok_or_else(|| Error::InvalidHoneytag("missing '-' separator".into()))?;
    let hi = decode_half(hi)?;
    let lo = decode_half(lo)?;
    Ok(((hi as u32) << 16) | lo as u32)
}

/// Check whether a string is shaped like a honeytag.
pub fn is_honeytag(tag: &str) -> bool {
    decode_honeytag(tag).is_ok()
}

fn encode_half(half: u16) -> [u8; 5] {
    [
        CONSONANTS[((half >> 12) & 0xF) as usize],
        VOWELS[((half >> 10) & 0x3) as usize],
        CONSONANTS[((half >> 6) & 0xF) as usize],
        VOWELS[((half >> 4) & 0x3) as usize],
        CONSONANTS[(half & 0xF) as usize],
    ]
}

fn decode_half(s: &str) -> Result<u16> {
    let bytes = s.as_bytes();
    if bytes.len() != 5 {
        return Err(Error::InvalidHoneytag(format!(
            "syllable must be 5 characters, got {}",
            bytes.len()
        )));
    }
    let c1 = consonant_index(bytes[0])?;
    let v1 = vowel_index(bytes[1])?;
    let c2 = consonant_index(bytes[2])?;
    let v2 = vowel_index(bytes[3])?;
    let c3 = consonant_index(bytes[4])?;
    Ok((c1 << 12) | (v1 << 10) | (c2 << 6) | (v2 << 4) | c3)
}

fn consonant_index(c: u8) -> Result<u16> {
    CONSONANTS
        .iter()
        .position(|&x| x == c)
        .map(|i| i as u16)
        .ok_or_else(|| Error::InvalidHoneytag(format!("'{}' is not a honeytag consonant", c as char)))
}

fn vowel_index(c: u8) -> Result<u16> {
    let idx = VOWELS
        .iter()
        .position(|&x| x == c)
        .ok_or_else(|| Error::InvalidHoneytag(format!("'{}' is not a honeytag vowel", c as char)))?;
    // 2-bit fields only ever produce the first four vowels
    if idx > 3 {
        return Err(Error::InvalidHoneytag(format!(
            "'{}' cannot appear in an encoded honeytag",
            c as char
        )));
    }
    Ok(idx as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn test_roundtrip_all_boundaries() {
        for word in [0u32, 1, 0xFFFF, 0x1_0000, 0xDEAD_BEEF, u32::MAX] {
            let tag = encode_honeytag(word);
            assert_eq!(decode_honeytag(&tag).unwrap(), word, "word {word:#x}");
        }
    }

    #[test]
    fn test_shape() {
        let tag = encode_honeytag(0);
        assert_eq!(tag.len(), 11);
        assert_eq!(tag, "babab-babab");
    }

    #[test]
    fn test_honeytag_matches_hash_prefix() {
        let id = Identity::generate();
        let bid = id.bid();
        let hash = blake3::hash(bid.as_bytes());
        let word = u32::from_be_bytes(hash.as_bytes()[..4].try_into().unwrap());

        assert_eq!(decode_honeytag(&honeytag(&bid)).unwrap(), word);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode_honeytag("bababbabab").is_err()); // no separator
        assert!(decode_honeytag("bab-babab").is_err()); // short syllable
        assert!(decode_honeytag("babab-babau").is_err()); // 'u' never encoded
        assert!(decode_honeytag("cabab-babab").is_err()); // 'c' not in alphabet
    }

    #[test]
    fn test_deterministic() {
        let id = Identity::from_seed(&[42u8; 32]);
        assert_eq!(honeytag(&id.bid()), honeytag(&id.bid()));
    }
}

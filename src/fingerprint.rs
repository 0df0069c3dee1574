//! Block fingerprinting.
//!
//! A fingerprint is a fast, non-cryptographic 53-bit hash of a block's text
//! with all whitespace removed. It is only a dedup key: two different blocks
//! may collide and nothing tries to detect that.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix used when a fingerprint is persisted as a session key
pub const STORAGE_KEY_PREFIX: &str = "bp_sent_";

const LANE1_SEED: u32 = 0xdead_beef;
const LANE2_SEED: u32 = 0x41c6_ce57;
const LANE1_MUL: u32 = 2_654_435_761;
const LANE2_MUL: u32 = 1_597_334_677;
const FINAL_MUL_A: u32 = 2_246_822_507;
const FINAL_MUL_B: u32 = 3_266_489_909;

/// Upper 21 bits kept from the second lane
const HIGH_MASK: u32 = 0x001f_ffff;

/// Dedup key derived from a block's normalized text (always < 2^53)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Key under which this fingerprint is stored in the session store
    pub fn storage_key(&self) -> String {
        format!("{}{}", STORAGE_KEY_PREFIX, self.0)
    }

    /// Parse a session key back into a fingerprint
    pub fn from_storage_key(key: &str) -> Option<Self> {
        key.strip_prefix(STORAGE_KEY_PREFIX)?
            .parse()
            .ok()
            .map(Self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fingerprint arbitrary text.
///
/// Whitespace is stripped first, so text that differs only in spacing or line
/// breaks maps to the same value. The mix runs over UTF-16 code units.
pub fn fingerprint(text: &str) -> Fingerprint {
    let normalized: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Fingerprint(mix(normalized.encode_utf16()))
}

fn mix(units: impl Iterator<Item = u16>) -> u64 {
    let mut h1 = LANE1_SEED;
    let mut h2 = LANE2_SEED;

    for unit in units {
        let ch = u32::from(unit);
        h1 = (h1 ^ ch).wrapping_mul(LANE1_MUL);
        h2 = (h2 ^ ch).wrapping_mul(LANE2_MUL);
    }

    h1 = (h1 ^ (h1 >> 16)).wrapping_mul(FINAL_MUL_A) ^ (h2 ^ (h2 >> 13)).wrapping_mul(FINAL_MUL_B);
    h2 = (h2 ^ (h2 >> 16)).wrapping_mul(FINAL_MUL_A) ^ (h1 ^ (h1 >> 13)).wrapping_mul(FINAL_MUL_B);

    (u64::from(h2 & HIGH_MASK) << 32) | u64::from(h1)
}

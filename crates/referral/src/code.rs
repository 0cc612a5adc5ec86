use core::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use referly_core::DomainError;

/// Length of every issued referral code.
pub const CODE_LEN: usize = 8;

/// Characters a referral code is drawn from. Uppercase alphanumerics with the
/// lookalikes (`0`/`O`, `1`/`I`) removed, since codes end up typed by hand and
/// read aloud.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Per-account referral code.
///
/// Opaque to callers; owned by exactly one account at a time. Rotation
/// substitutes a fresh value and atomically invalidates the old one, both of
/// which are storage-layer concerns rather than properties of the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferralCode(String);

impl ReferralCode {
    /// Draw a fresh code from `rng`.
    ///
    /// Uniqueness is *not* guaranteed here; callers issue against the code
    /// directory and retry on collision.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code: String = (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReferralCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != CODE_LEN {
            return Err(DomainError::validation(format!(
                "referral code must be {CODE_LEN} characters"
            )));
        }
        if !s.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
            return Err(DomainError::validation(
                "referral code contains characters outside the code alphabet",
            ));
        }
        Ok(Self(s.to_string()))
    }
}

use crate::error::ValidationError;
use crate::types::Labels;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex length of a SHA-256 digest.
const FINGERPRINT_LEN: usize = 64;

/// Separator between `key=value` pairs. `0xff` never appears in valid UTF-8,
/// so no label value can forge a pair boundary.
const PAIR_SEPARATOR: u8 = 0xff;

/// Content hash of an alert's label set, used as its primary key.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use vigil_common::Fingerprint;
///
/// let mut a = HashMap::new();
/// a.insert("alertname".to_string(), "HighCPU".to_string());
/// a.insert("instance".to_string(), "node1".to_string());
///
/// let mut b = HashMap::new();
/// b.insert("instance".to_string(), "node1".to_string());
/// b.insert("alertname".to_string(), "HighCPU".to_string());
///
/// assert_eq!(Fingerprint::from_labels(&a), Fingerprint::from_labels(&b));
/// assert_eq!(Fingerprint::from_labels(&a).as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_labels(labels: &Labels) -> Self {
        let mut pairs: Vec<(&String, &String)> = labels.iter().collect();
        pairs.sort();

        let mut hasher = Sha256::new();
        for (key, value) in pairs {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update([PAIR_SEPARATOR]);
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = ValidationError;

    /// Accepts only what [`Fingerprint::from_labels`] produces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let well_formed = s.len() == FINGERPRINT_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::InvalidFingerprint(s.to_string()))
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

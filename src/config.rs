//! Parameters of an MPC run, shared by all parties.

use serde::{Deserialize, Serialize};

use crate::{field::MODULUS_BITS, protocol::Error};

/// When opened values are checked against their MACs.
///
/// A final check always runs before [`crate::protocol::mpc`] returns, so no opened value leaves a
/// run unchecked. The policy only decides how many checks happen before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacCheckPolicy {
    /// Check after every evaluated batch that opened something.
    EveryRound,
    /// Check as soon as at least `threshold` values are waiting.
    Batched {
        /// The number of opened values that triggers a check.
        threshold: usize,
    },
    /// Check only once, at the end of the run.
    AtEnd,
}

impl Default for MacCheckPolicy {
    fn default() -> Self {
        MacCheckPolicy::Batched { threshold: 1024 }
    }
}

/// The configuration of an MPC run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The maximum number of native operations evaluated per batch.
    pub batch_size: usize,
    /// When MAC checks happen.
    pub mac_check: MacCheckPolicy,
    /// The bit length of the values compared by comparison circuits.
    pub max_bit_length: u32,
    /// The statistical security parameter of the masks used by comparisons.
    pub statistical_security: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 4096,
            mac_check: MacCheckPolicy::default(),
            max_bit_length: 32,
            statistical_security: 40,
        }
    }
}

impl Config {
    /// Checks that the parameters are usable, in particular that comparison masks fit the field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".to_string()));
        }
        if let MacCheckPolicy::Batched { threshold: 0 } = self.mac_check {
            return Err(Error::Config("MAC check threshold must be positive".to_string()));
        }
        check_mask_size(self.max_bit_length, self.statistical_security)
    }
}

/// Checks that `bit_length + statistical_security` bit masks leave room for a carry in the field.
pub(crate) fn check_mask_size(bit_length: u32, statistical_security: u32) -> Result<(), Error> {
    if bit_length == 0 {
        return Err(Error::Config("bit length must be positive".to_string()));
    }
    let required = bit_length.saturating_add(statistical_security).saturating_add(2);
    if required >= MODULUS_BITS {
        return Err(Error::Config(format!(
            "{bit_length} bit values with {statistical_security} bits of statistical security \
            do not fit the {MODULUS_BITS} bit field"
        )));
    }
    Ok(())
}

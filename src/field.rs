//! Arithmetic in the prime field `F_p` with the Mersenne prime `p = 2^127 - 1`.
//!
//! All values are kept fully reduced in `[0, p)`. The modulus is large enough to leave room for
//! `max_bit_length + statistical_security` bit masks used by the comparison circuits.

use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// The field modulus `2^127 - 1`.
pub const MODULUS: u128 = (1 << 127) - 1;

/// The number of bits of the field modulus.
pub const MODULUS_BITS: u32 = 127;

/// An element of the prime field `F_p`, `p = 2^127 - 1`.
///
/// Deserializing rejects values that are not fully reduced, so values received from other parties
/// always satisfy the invariant of the arithmetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u128", into = "u128")]
pub struct Fp(u128);

/// A value outside of `[0, p)` was received where a reduced field element was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} is not a reduced field element")]
pub struct NonCanonical(pub u128);

impl Fp {
    /// The additive identity.
    pub const ZERO: Fp = Fp(0);
    /// The multiplicative identity.
    pub const ONE: Fp = Fp(1);

    /// Creates a field element, reducing `value` modulo `p`.
    pub const fn new(value: u128) -> Self {
        Fp(reduce(value))
    }

    /// Returns the canonical representative in `[0, p)`.
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    /// Whether this is the zero element.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Samples a uniformly random field element.
    pub fn random(rng: &mut impl Rng) -> Self {
        // rejection sampling, the only rejected value is p itself
        loop {
            let candidate = rng.random::<u128>() & MODULUS;
            if candidate != MODULUS {
                return Fp(candidate);
            }
        }
    }

    /// Raises `self` to the power `exp` (square and multiply).
    pub fn pow(self, mut exp: u128) -> Self {
        let mut base = self;
        let mut acc = Fp::ONE;
        while exp > 0 {
            if exp & 1 == 1 {
                acc *= base;
            }
            base *= base;
            exp >>= 1;
        }
        acc
    }

    /// Returns the multiplicative inverse, or `None` for zero.
    pub fn inverse(self) -> Option<Self> {
        if self.is_zero() {
            None
        } else {
            // Fermat: a^(p-2) = a^-1
            Some(self.pow(MODULUS - 2))
        }
    }

    /// Returns `2^exp` as a field element.
    pub fn power_of_two(exp: u32) -> Self {
        if exp < MODULUS_BITS {
            Fp(1 << exp)
        } else {
            Fp(2).pow(exp as u128)
        }
    }

    /// Returns bit `i` of the canonical representative.
    pub fn bit(self, i: u32) -> bool {
        i < 128 && (self.0 >> i) & 1 == 1
    }
}

const fn reduce(value: u128) -> u128 {
    // 2^127 = 1 (mod p)
    let folded = (value & MODULUS) + (value >> 127);
    if folded >= MODULUS {
        folded - MODULUS
    } else {
        folded
    }
}

/// Multiplies two reduced values and reduces the 254 bit product modulo `p`.
fn mul_reduce(a: u128, b: u128) -> u128 {
    const LO: u128 = u64::MAX as u128;
    let (a0, a1) = (a & LO, a >> 64);
    let (b0, b1) = (b & LO, b >> 64);
    let p0 = a0 * b0;
    // a1, b1 < 2^63, so the sum of the cross terms cannot overflow
    let mid = a0 * b1 + a1 * b0;
    let p3 = a1 * b1;
    let (lo, carry) = p0.overflowing_add(mid << 64);
    let hi = p3 + (mid >> 64) + carry as u128;
    // product = hi * 2^128 + lo = (2 * hi + lo_127) * 2^127 + (lo mod 2^127)
    let folded = (lo & MODULUS) + ((hi << 1) | (lo >> 127));
    reduce(folded)
}

impl fmt::Display for Fp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u128> for Fp {
    type Error = NonCanonical;

    fn try_from(value: u128) -> Result<Self, Self::Error> {
        if value < MODULUS {
            Ok(Fp(value))
        } else {
            Err(NonCanonical(value))
        }
    }
}

impl From<Fp> for u128 {
    fn from(value: Fp) -> Self {
        value.0
    }
}

impl From<u64> for Fp {
    fn from(value: u64) -> Self {
        Fp(value as u128)
    }
}

impl From<i64> for Fp {
    fn from(value: i64) -> Self {
        if value < 0 {
            -Fp(value.unsigned_abs() as u128)
        } else {
            Fp(value as u128)
        }
    }
}

impl From<bool> for Fp {
    fn from(value: bool) -> Self {
        Fp(value as u128)
    }
}

impl Add for Fp {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Fp(reduce(self.0 + rhs.0))
    }
}

impl Sub for Fp {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        if self.0 >= rhs.0 {
            Fp(self.0 - rhs.0)
        } else {
            Fp(self.0 + (MODULUS - rhs.0))
        }
    }
}

impl Mul for Fp {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Fp(mul_reduce(self.0, rhs.0))
    }
}

impl Neg for Fp {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Fp::ZERO - self
    }
}

impl AddAssign for Fp {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Fp {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Fp {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Sum for Fp {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Fp::ZERO, |acc, x| acc + x)
    }
}

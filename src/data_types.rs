//! Data types used across different parts of the SMPC engine.

use std::{
    fmt,
    ops::{Add, Mul, Neg, Sub},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};

use crate::{field::Fp, protocol::Error};

/// The party that adds public constants to its value share.
pub const DESIGNATED_PARTY: usize = 0;

/// One party's additive share of a secret value together with its share of the value's MAC.
///
/// Summing the `value` shares of all parties reconstructs the secret `x`, summing the `mac`
/// shares reconstructs `key * x` for the global MAC key `key` (which is itself additively shared).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareElement {
    /// The share of the value.
    pub value: Fp,
    /// The share of the MAC of the value.
    pub mac: Fp,
}

impl ShareElement {
    /// Creates a share from its value and MAC parts.
    pub fn new(value: Fp, mac: Fp) -> Self {
        Self { value, mac }
    }

    /// Adds a public constant to the shared value.
    ///
    /// Only the [`DESIGNATED_PARTY`] changes its value share, every party adjusts its MAC share by
    /// `constant * key_share` so that the MAC relation still holds for the new value.
    pub fn add_public(self, constant: Fp, key_share: Fp, party: usize) -> Self {
        let value = if party == DESIGNATED_PARTY {
            self.value + constant
        } else {
            self.value
        };
        Self {
            value,
            mac: self.mac + constant * key_share,
        }
    }

    /// The share that every party holds of a publicly known constant.
    pub fn known(constant: Fp, key_share: Fp, party: usize) -> Self {
        Self::default().add_public(constant, key_share, party)
    }
}

impl Add for ShareElement {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        ShareElement::new(self.value + rhs.value, self.mac + rhs.mac)
    }
}

impl Sub for ShareElement {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        ShareElement::new(self.value - rhs.value, self.mac - rhs.mac)
    }
}

impl Neg for ShareElement {
    type Output = Self;

    fn neg(self) -> Self::Output {
        ShareElement::new(-self.value, -self.mac)
    }
}

impl Mul<Fp> for ShareElement {
    type Output = Self;

    fn mul(self, rhs: Fp) -> Self::Output {
        ShareElement::new(self.value * rhs, self.mac * rhs)
    }
}

/// A slot that is shared between the operation producing a value and its consumers.
struct Slot<T>(Arc<Mutex<Option<T>>>);

impl<T: Copy> Slot<T> {
    fn empty() -> Self {
        Slot(Arc::new(Mutex::new(None)))
    }

    fn with(value: T) -> Self {
        Slot(Arc::new(Mutex::new(Some(value))))
    }

    fn get(&self) -> Option<T> {
        *self.0.lock().expect("poison")
    }

    fn set(&self, value: T) {
        *self.0.lock().expect("poison") = Some(value);
    }

    fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot(Arc::clone(&self.0))
    }
}

/// A handle to a secret shared value, set by the operation that produces it.
///
/// Cloning the handle does not copy the value, all clones refer to the same slot.
#[derive(Clone)]
pub struct SInt(Slot<ShareElement>);

impl SInt {
    /// A new handle that is not yet assigned.
    pub fn uninit() -> Self {
        SInt(Slot::empty())
    }

    /// A handle that already holds the given share.
    pub fn with_share(share: ShareElement) -> Self {
        SInt(Slot::with(share))
    }

    /// Reads the share, failing if no operation has assigned it yet.
    pub fn share(&self) -> Result<ShareElement, Error> {
        self.0.get().ok_or(Error::UninitializedValue("SInt"))
    }

    /// Assigns the share.
    ///
    /// Handles are written once, except by in-place circuits: overwriting a value is only valid
    /// if the overwriting operation runs in a later round than every reader of the old value.
    pub fn set(&self, share: ShareElement) {
        self.0.set(share)
    }

    /// Whether the handle has been assigned.
    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    /// Whether both handles refer to the same slot.
    pub fn same_as(&self, other: &SInt) -> bool {
        self.0.same_slot(&other.0)
    }
}

impl fmt::Debug for SInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(share) => write!(f, "SInt({}, {})", share.value, share.mac),
            None => f.write_str("SInt(<unset>)"),
        }
    }
}

/// A handle to a public (opened) value.
#[derive(Clone)]
pub struct OInt(Slot<Fp>);

impl OInt {
    /// A new handle that is not yet assigned.
    pub fn uninit() -> Self {
        OInt(Slot::empty())
    }

    /// A handle holding the given public value.
    pub fn with_value(value: Fp) -> Self {
        OInt(Slot::with(value))
    }

    /// Reads the value, failing if it has not been opened (to this party).
    pub fn value(&self) -> Result<Fp, Error> {
        self.0.get().ok_or(Error::UninitializedValue("OInt"))
    }

    /// Reads the value if it is set. Parties that are not the target of an output stay `None`.
    pub fn try_value(&self) -> Option<Fp> {
        self.0.get()
    }

    /// Assigns the value.
    pub fn set(&self, value: Fp) {
        self.0.set(value)
    }
}

impl fmt::Debug for OInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(value) => write!(f, "OInt({value})"),
            None => f.write_str("OInt(<unset>)"),
        }
    }
}

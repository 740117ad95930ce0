//! Circuits composed from native operations.
//!
//! None of these touch the native operations directly, they only combine factory leaves with the
//! nodes of [`crate::producer`].

mod compare;
mod lookup;
mod sort;

pub use compare::{CompareState, GreaterOrEqual, equality};
pub use lookup::{LinearLookUp, LookUpState};
pub use sort::keyed_compare_and_swap;

use serde::{Deserialize, Serialize};

use crate::{
    config::{Config, check_mask_size},
    data_types::SInt,
    factory::{SpdzFactory, SpdzProducer},
    producer::{Parallel, Sequential},
    protocol::Error,
};

/// The parameters of comparison circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareParams {
    /// Compared values must be smaller than `2^bit_length`.
    pub bit_length: u32,
    /// The number of extra mask bits that hide the compared difference.
    pub statistical_security: u32,
}

impl CompareParams {
    /// Checks that the masks fit the field.
    pub fn validate(&self) -> Result<(), Error> {
        check_mask_size(self.bit_length, self.statistical_security)
    }
}

impl From<&Config> for CompareParams {
    fn from(config: &Config) -> Self {
        Self {
            bit_length: config.max_bit_length,
            statistical_security: config.statistical_security,
        }
    }
}

/// `result = b + selector * (a - b)`, i.e. `a` if the selector bit is 1 and `b` if it is 0.
///
/// `result` may be the same handle as `a` or `b`.
pub fn conditional_select(
    factory: &SpdzFactory,
    selector: &SInt,
    a: &SInt,
    b: &SInt,
    result: &SInt,
) -> SpdzProducer {
    let diff = factory.sint();
    let product = factory.sint();
    Box::new(
        Sequential::new()
            .then(factory.sub(a, b, &diff))
            .then(factory.mult(selector, &diff, &product))
            .then(factory.add(b, &product, result)),
    )
}

/// `result = sum(a_i * b_i)`, with all products in one round.
pub fn inner_product(
    factory: &SpdzFactory,
    a: &[SInt],
    b: &[SInt],
    result: &SInt,
) -> Result<SpdzProducer, Error> {
    if a.len() != b.len() {
        return Err(Error::Config(format!(
            "inner product of vectors of length {} and {}",
            a.len(),
            b.len()
        )));
    }
    let mut products = Parallel::new();
    let mut terms = vec![];
    for (a, b) in a.iter().zip(b) {
        let product = factory.sint();
        products.append(factory.mult(a, b, &product));
        terms.push(product);
    }
    Ok(Box::new(
        Sequential::new()
            .then(products)
            .then(factory.sum(&terms, result)),
    ))
}

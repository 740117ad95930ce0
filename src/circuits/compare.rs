//! Comparison of bounded secret integers.
//!
//! `x >= y` for `x, y < 2^l` is bit `l` of `z = 2^l + x - y`. The bit is extracted by masking `z`
//! with random bits, opening the masked value and comparing its low `l` bits with the low mask
//! bits, which yields `z mod 2^l` and thus `(z - (z mod 2^l)) / 2^l`.

use crate::{
    circuits::CompareParams,
    data_types::{OInt, SInt},
    factory::{SpdzFactory, SpdzProducer},
    field::Fp,
    native::SpdzNative,
    producer::{BoxedProducer, Parallel, RoundBased, RoundProtocol, Sequential},
    protocol::Error,
};

/// The rounds of a [`GreaterOrEqual`] comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareState {
    /// Draw the mask bits and open the masked difference.
    Mask,
    /// Compare the opened value with the mask bitwise and derive the result.
    Resolve,
    /// The result is assigned.
    Done,
}

/// Computes `out = 1` if `x >= y` and `out = 0` otherwise, for `x, y < 2^bit_length`.
#[derive(Debug)]
pub struct GreaterOrEqual {
    factory: SpdzFactory,
    params: CompareParams,
    x: SInt,
    y: SInt,
    out: SInt,
    bits: Vec<SInt>,
    masked: OInt,
}

impl GreaterOrEqual {
    /// Creates the comparison, failing if the parameters exceed the field.
    pub fn new(
        factory: &SpdzFactory,
        params: CompareParams,
        x: &SInt,
        y: &SInt,
        out: &SInt,
    ) -> Result<Self, Error> {
        params.validate()?;
        let mask_bits = (params.bit_length + params.statistical_security) as usize;
        Ok(Self {
            factory: factory.clone(),
            params,
            x: x.clone(),
            y: y.clone(),
            out: out.clone(),
            bits: (0..mask_bits).map(|_| factory.sint()).collect(),
            masked: factory.oint(),
        })
    }

    /// The comparison as a protocol tree.
    pub fn into_producer(self) -> SpdzProducer {
        Box::new(RoundBased::new(self))
    }

    fn mask(&self) -> SpdzProducer {
        let f = &self.factory;
        let l = self.params.bit_length;
        let mut draws = Parallel::new();
        for bit in &self.bits {
            draws.append(f.random_bit(bit));
        }
        // 2^l + x - y + sum(2^i * r_i)
        let mut terms = vec![
            (Fp::ONE, f.known(Fp::power_of_two(l))),
            (Fp::ONE, self.x.clone()),
            (-Fp::ONE, self.y.clone()),
        ];
        terms.extend(
            self.bits
                .iter()
                .enumerate()
                .map(|(i, bit)| (Fp::power_of_two(i as u32), bit.clone())),
        );
        let masked = f.sint();
        Box::new(
            Sequential::new()
                .then(draws)
                .then(f.linear_combination(terms, &masked))
                .then(f.open(&masked, &self.masked)),
        )
    }

    fn resolve(&self) -> Result<SpdzProducer, Error> {
        let f = &self.factory;
        let l = self.params.bit_length as usize;
        let c = self.masked.value()?;
        let c_low = Fp::new(c.as_u128() & ((1 << l) - 1));
        let one = f.oint_from(1u64);

        // d_i = c_i xor r_i, linear because c_i is public
        let mut xors = Parallel::new();
        let mut diffs = Vec::with_capacity(l);
        for (i, bit) in self.bits[..l].iter().enumerate() {
            if c.bit(i as u32) {
                let d = f.sint();
                xors.append(f.sub_from_public(&one, bit, &d));
                diffs.push(d);
            } else {
                diffs.push(bit.clone());
            }
        }

        // prefix or from the most significant bit: e_i = e_{i+1} + d_i - e_{i+1} * d_i
        let mut prefix = diffs.clone();
        let mut or_chain = Sequential::new();
        for i in (0..l - 1).rev() {
            let product = f.sint();
            let e = f.sint();
            or_chain.append(f.mult(&prefix[i + 1], &diffs[i], &product));
            or_chain.append(f.linear_combination(
                vec![
                    (Fp::ONE, prefix[i + 1].clone()),
                    (Fp::ONE, diffs[i].clone()),
                    (-Fp::ONE, product),
                ],
                &e,
            ));
            prefix[i] = e;
        }

        // u = [c' < r'] is the sum of e_i - e_{i+1} over all i with c_i = 0, and
        // out = (z - (c' - r' + 2^l * u)) / 2^l = (c - c' - sum(2^i * r_i for i >= l)) / 2^l - u
        let inv = Fp::power_of_two(l as u32)
            .inverse()
            .ok_or(Error::ZeroInversion)?;
        let mut terms = vec![(inv, f.known(c - c_low))];
        for (i, bit) in self.bits.iter().enumerate().skip(l) {
            terms.push((-(inv * Fp::power_of_two(i as u32)), bit.clone()));
        }
        for i in (0..l).filter(|i| !c.bit(*i as u32)) {
            terms.push((-Fp::ONE, prefix[i].clone()));
            if let Some(next) = prefix.get(i + 1) {
                terms.push((Fp::ONE, next.clone()));
            }
        }
        Ok(Box::new(
            Sequential::new()
                .then(xors)
                .then(or_chain)
                .then(f.linear_combination(terms, &self.out)),
        ))
    }
}

impl RoundProtocol<SpdzNative> for GreaterOrEqual {
    type State = CompareState;

    fn initial_state(&self) -> CompareState {
        CompareState::Mask
    }

    fn is_terminal(&self, state: &CompareState) -> bool {
        *state == CompareState::Done
    }

    fn next_round(
        &mut self,
        state: CompareState,
    ) -> Result<(Option<BoxedProducer<SpdzNative>>, CompareState), Error> {
        match state {
            CompareState::Mask => Ok((Some(self.mask()), CompareState::Resolve)),
            CompareState::Resolve => Ok((Some(self.resolve()?), CompareState::Done)),
            CompareState::Done => Ok((None, CompareState::Done)),
        }
    }
}

/// `out = 1` if `x == y` and `out = 0` otherwise, computed as `(x >= y) * (y >= x)`.
pub fn equality(
    factory: &SpdzFactory,
    params: CompareParams,
    x: &SInt,
    y: &SInt,
    out: &SInt,
) -> Result<SpdzProducer, Error> {
    let ge = factory.sint();
    let le = factory.sint();
    let both = Parallel::new()
        .with(GreaterOrEqual::new(factory, params, x, y, &ge)?.into_producer())
        .with(GreaterOrEqual::new(factory, params, y, x, &le)?.into_producer());
    Ok(Box::new(
        Sequential::new()
            .then(both)
            .then(factory.mult(&ge, &le, out)),
    ))
}

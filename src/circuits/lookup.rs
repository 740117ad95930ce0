use crate::{
    circuits::{CompareParams, compare::equality, conditional_select},
    data_types::SInt,
    factory::{SpdzFactory, SpdzProducer},
    native::SpdzNative,
    producer::{BoxedProducer, Parallel, RoundBased, RoundProtocol, Sequential},
    protocol::Error,
};

/// The rounds of a [`LinearLookUp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookUpState {
    /// Compare the lookup key with every key.
    Compare,
    /// Select the values of the matching key into the outputs.
    Select,
    /// The outputs are assigned.
    Done,
}

/// Looks up the values stored under a secret key by comparing it with every key.
///
/// If no key matches, the outputs keep the values they had before. Keys must be distinct.
#[derive(Debug)]
pub struct LinearLookUp {
    factory: SpdzFactory,
    params: CompareParams,
    lookup_key: SInt,
    keys: Vec<SInt>,
    values: Vec<Vec<SInt>>,
    outputs: Vec<SInt>,
    matches: Vec<SInt>,
}

impl LinearLookUp {
    /// Looks up a single value per key.
    pub fn new(
        factory: &SpdzFactory,
        params: CompareParams,
        lookup_key: &SInt,
        keys: &[SInt],
        values: &[SInt],
        output: &SInt,
    ) -> Result<Self, Error> {
        let values: Vec<Vec<SInt>> = values.iter().map(|v| vec![v.clone()]).collect();
        Self::array(
            factory,
            params,
            lookup_key,
            keys,
            &values,
            std::slice::from_ref(output),
        )
    }

    /// Looks up an array of values per key, all arrays must have the length of `outputs`.
    pub fn array(
        factory: &SpdzFactory,
        params: CompareParams,
        lookup_key: &SInt,
        keys: &[SInt],
        values: &[Vec<SInt>],
        outputs: &[SInt],
    ) -> Result<Self, Error> {
        params.validate()?;
        if keys.len() != values.len() {
            return Err(Error::Config(format!(
                "lookup table has {} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        if let Some(row) = values.iter().position(|row| row.len() != outputs.len()) {
            return Err(Error::Config(format!(
                "lookup row {row} has {} values, expected {}",
                values[row].len(),
                outputs.len()
            )));
        }
        Ok(Self {
            factory: factory.clone(),
            params,
            lookup_key: lookup_key.clone(),
            keys: keys.to_vec(),
            values: values.to_vec(),
            outputs: outputs.to_vec(),
            matches: keys.iter().map(|_| factory.sint()).collect(),
        })
    }

    /// The lookup as a protocol tree.
    pub fn into_producer(self) -> SpdzProducer {
        Box::new(RoundBased::new(self))
    }

    fn compare(&self) -> Result<SpdzProducer, Error> {
        let mut comparisons = Parallel::new();
        for (key, matched) in self.keys.iter().zip(&self.matches) {
            comparisons.append(equality(
                &self.factory,
                self.params,
                key,
                &self.lookup_key,
                matched,
            )?);
        }
        Ok(Box::new(comparisons))
    }

    fn select(&self) -> SpdzProducer {
        let mut chain = Sequential::new();
        for (matched, row) in self.matches.iter().zip(&self.values) {
            let mut selects = Parallel::new();
            for (value, output) in row.iter().zip(&self.outputs) {
                selects.append(conditional_select(
                    &self.factory,
                    matched,
                    value,
                    output,
                    output,
                ));
            }
            chain.append(selects);
        }
        Box::new(chain)
    }
}

impl RoundProtocol<SpdzNative> for LinearLookUp {
    type State = LookUpState;

    fn initial_state(&self) -> LookUpState {
        LookUpState::Compare
    }

    fn is_terminal(&self, state: &LookUpState) -> bool {
        *state == LookUpState::Done
    }

    fn next_round(
        &mut self,
        state: LookUpState,
    ) -> Result<(Option<BoxedProducer<SpdzNative>>, LookUpState), Error> {
        match state {
            LookUpState::Compare => Ok((Some(self.compare()?), LookUpState::Select)),
            LookUpState::Select => Ok((Some(self.select()), LookUpState::Done)),
            LookUpState::Done => Ok((None, LookUpState::Done)),
        }
    }
}

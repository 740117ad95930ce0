//! Preprocessed correlated randomness consumed by the online phase.
//!
//! The online protocol never generates triples, bits or masks itself, it draws them from a
//! [`Supplier`]. Every item handed out must be fresh: reusing a triple or a mask leaks information
//! about the values it was used for.
//!
//! [`Dealer`] is a trusted dealer for tests and simulations. All parties derive the same global
//! dealing from a common seed and keep only their own shares, which is of course not secure
//! against the parties themselves.

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{data_types::ShareElement, field::Fp};

/// The kinds of preprocessed material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialKind {
    /// Multiplication triples.
    Triple,
    /// Shared random bits.
    Bit,
    /// Exponentiation pipes.
    ExpPipe,
    /// Input masks known to a single party.
    InputMask,
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialKind::Triple => f.write_str("multiplication triples"),
            MaterialKind::Bit => f.write_str("random bits"),
            MaterialKind::ExpPipe => f.write_str("exponentiation pipes"),
            MaterialKind::InputMask => f.write_str("input masks"),
        }
    }
}

/// Errors that can occur while drawing preprocessed material.
#[derive(Debug, thiserror::Error)]
pub enum PreprocessingError {
    /// No material of the given kind is left.
    #[error("preprocessing material exhausted: no {0} left")]
    Exhausted(MaterialKind),
    /// The mask owner did not receive the clear mask value.
    #[error("input mask owned by party {0} is missing its clear value")]
    MissingMask(usize),
    /// A dealer was requested for a party index outside of `0..parties`.
    #[error("party {party} does not exist in a run with {parties} parties")]
    UnknownParty {
        /// The requested party index.
        party: usize,
        /// The number of parties of the run.
        parties: usize,
    },
    /// An exponentiation pipe is shorter than requested.
    #[error("exponentiation pipe of length {available} is too short for {requested} powers")]
    PipeTooShort {
        /// The length of the pipes of this supplier.
        available: usize,
        /// The number of entries requested by the circuit.
        requested: usize,
    },
}

/// A multiplication triple `(a, b, c)` with `c = a * b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    /// Share of the random `a`.
    pub a: ShareElement,
    /// Share of the random `b`.
    pub b: ShareElement,
    /// Share of `c = a * b`.
    pub c: ShareElement,
}

/// A shared random value `r` that one party (the owner) knows in the clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMask {
    /// This party's share of `r`.
    pub share: ShareElement,
    /// The clear value `r`, only present at the owner.
    pub mask: Option<Fp>,
}

/// A source of single-use preprocessed material for one party.
pub trait Supplier: Send {
    /// Returns a fresh multiplication triple.
    fn next_triple(&mut self) -> Result<Triple, PreprocessingError>;

    /// Returns a fresh share of a uniformly random bit.
    fn next_bit(&mut self) -> Result<ShareElement, PreprocessingError>;

    /// Returns a fresh exponentiation pipe `[r^-1, r, r^2, ..., r^l]` for a random non-zero `r`.
    fn next_exp_pipe(&mut self) -> Result<Vec<ShareElement>, PreprocessingError>;

    /// Returns a fresh input mask whose clear value is known to `owner`.
    fn next_input_mask(&mut self, owner: usize) -> Result<InputMask, PreprocessingError>;

    /// This party's additive share of the global MAC key, fixed for the whole run.
    fn mac_key_share(&self) -> Fp;
}

/// Upper bounds on how much material a [`Dealer`] hands out, `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DealerLimits {
    /// Maximum number of triples.
    pub triples: Option<usize>,
    /// Maximum number of random bits.
    pub bits: Option<usize>,
    /// Maximum number of exponentiation pipes.
    pub exp_pipes: Option<usize>,
    /// Maximum number of input masks.
    pub input_masks: Option<usize>,
}

/// The setup shared by the dealers of all parties of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerConfig {
    /// The common seed all parties derive the dealing from.
    pub seed: [u8; 32],
    /// How much material is available.
    pub limits: DealerLimits,
    /// The highest power `l` contained in an exponentiation pipe.
    pub exp_pipe_length: usize,
}

impl DealerConfig {
    /// An unbounded dealer setup with the given seed.
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            limits: DealerLimits::default(),
            exp_pipe_length: 8,
        }
    }
}

impl Default for DealerConfig {
    fn default() -> Self {
        Self::new(rand::random())
    }
}

/// How much material a [`Dealer`] has handed out so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerStats {
    /// Triples consumed.
    pub triples: usize,
    /// Random bits consumed.
    pub bits: usize,
    /// Exponentiation pipes consumed.
    pub exp_pipes: usize,
    /// Input masks consumed.
    pub input_masks: usize,
}

/// A deterministic trusted dealer, see the module documentation.
pub struct Dealer {
    party: usize,
    parties: usize,
    key_shares: Vec<Fp>,
    triples: ChaCha20Rng,
    bits: ChaCha20Rng,
    exp_pipes: ChaCha20Rng,
    input_masks: ChaCha20Rng,
    limits: DealerLimits,
    exp_pipe_length: usize,
    stats: DealerStats,
}

impl fmt::Debug for Dealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dealer")
            .field("party", &self.party)
            .field("parties", &self.parties)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn stream(seed: [u8; 32], kind: u64) -> ChaCha20Rng {
    let mut rng = ChaCha20Rng::from_seed(seed);
    rng.set_stream(kind);
    rng
}

impl Dealer {
    /// Creates the dealer instance of `party` out of `parties`.
    pub fn new(
        config: &DealerConfig,
        party: usize,
        parties: usize,
    ) -> Result<Self, PreprocessingError> {
        if party >= parties {
            return Err(PreprocessingError::UnknownParty { party, parties });
        }
        let mut keys = stream(config.seed, 0);
        let key_shares = (0..parties).map(|_| Fp::random(&mut keys)).collect();
        debug!(party, parties, "dealer initialized");
        Ok(Self {
            party,
            parties,
            key_shares,
            triples: stream(config.seed, 1),
            bits: stream(config.seed, 2),
            exp_pipes: stream(config.seed, 3),
            input_masks: stream(config.seed, 4),
            limits: config.limits,
            exp_pipe_length: config.exp_pipe_length,
            stats: DealerStats::default(),
        })
    }

    /// The global MAC key, i.e. the sum of all parties' key shares.
    ///
    /// Only a trusted dealer can know this, it exists to let tests check MAC relations.
    pub fn global_mac_key(&self) -> Fp {
        self.key_shares.iter().copied().sum()
    }

    /// How much material has been consumed.
    pub fn stats(&self) -> DealerStats {
        self.stats
    }

    fn take(
        used: &mut usize,
        limit: Option<usize>,
        kind: MaterialKind,
    ) -> Result<(), PreprocessingError> {
        if limit.is_some_and(|limit| *used >= limit) {
            return Err(PreprocessingError::Exhausted(kind));
        }
        *used += 1;
        Ok(())
    }
}

/// Splits `value` into authenticated shares for all parties and returns the share of `party`.
///
/// Every party draws the same amount of randomness, so dealers stay in sync.
fn deal(rng: &mut ChaCha20Rng, key_shares: &[Fp], party: usize, value: Fp) -> ShareElement {
    let key: Fp = key_shares.iter().copied().sum();
    let mac = key * value;
    let parties = key_shares.len();
    let mut own = ShareElement::default();
    let mut sum = ShareElement::default();
    for p in 0..parties {
        let share = if p + 1 == parties {
            ShareElement::new(value - sum.value, mac - sum.mac)
        } else {
            ShareElement::new(Fp::random(rng), Fp::random(rng))
        };
        sum = sum + share;
        if p == party {
            own = share;
        }
    }
    own
}

impl Supplier for Dealer {
    fn next_triple(&mut self) -> Result<Triple, PreprocessingError> {
        Self::take(&mut self.stats.triples, self.limits.triples, MaterialKind::Triple)?;
        let rng = &mut self.triples;
        let a = Fp::random(rng);
        let b = Fp::random(rng);
        Ok(Triple {
            a: deal(rng, &self.key_shares, self.party, a),
            b: deal(rng, &self.key_shares, self.party, b),
            c: deal(rng, &self.key_shares, self.party, a * b),
        })
    }

    fn next_bit(&mut self) -> Result<ShareElement, PreprocessingError> {
        Self::take(&mut self.stats.bits, self.limits.bits, MaterialKind::Bit)?;
        let bit = Fp::from(self.bits.random::<bool>());
        Ok(deal(&mut self.bits, &self.key_shares, self.party, bit))
    }

    fn next_exp_pipe(&mut self) -> Result<Vec<ShareElement>, PreprocessingError> {
        Self::take(
            &mut self.stats.exp_pipes,
            self.limits.exp_pipes,
            MaterialKind::ExpPipe,
        )?;
        let rng = &mut self.exp_pipes;
        let (r, r_inv) = loop {
            let r = Fp::random(rng);
            if let Some(inv) = r.inverse() {
                break (r, inv);
            }
        };
        let mut pipe = Vec::with_capacity(self.exp_pipe_length + 1);
        pipe.push(deal(rng, &self.key_shares, self.party, r_inv));
        let mut power = Fp::ONE;
        for _ in 0..self.exp_pipe_length {
            power *= r;
            pipe.push(deal(rng, &self.key_shares, self.party, power));
        }
        Ok(pipe)
    }

    fn next_input_mask(&mut self, owner: usize) -> Result<InputMask, PreprocessingError> {
        Self::take(
            &mut self.stats.input_masks,
            self.limits.input_masks,
            MaterialKind::InputMask,
        )?;
        let r = Fp::random(&mut self.input_masks);
        let share = deal(&mut self.input_masks, &self.key_shares, self.party, r);
        Ok(InputMask {
            share,
            mask: (owner == self.party).then_some(r),
        })
    }

    fn mac_key_share(&self) -> Fp {
        self.key_shares[self.party]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dealers(parties: usize, limits: DealerLimits) -> Vec<Dealer> {
        let config = DealerConfig {
            limits,
            ..DealerConfig::new([7; 32])
        };
        (0..parties)
            .map(|p| Dealer::new(&config, p, parties).unwrap())
            .collect()
    }

    fn open(shares: &[ShareElement]) -> ShareElement {
        shares.iter().fold(ShareElement::default(), |acc, s| acc + *s)
    }

    #[test]
    fn triples_are_authenticated_products() -> Result<(), PreprocessingError> {
        let mut dealers = dealers(3, DealerLimits::default());
        let key = dealers[0].global_mac_key();
        for _ in 0..10 {
            let triples = dealers
                .iter_mut()
                .map(|d| d.next_triple())
                .collect::<Result<Vec<_>, _>>()?;
            let a = open(&triples.iter().map(|t| t.a).collect::<Vec<_>>());
            let b = open(&triples.iter().map(|t| t.b).collect::<Vec<_>>());
            let c = open(&triples.iter().map(|t| t.c).collect::<Vec<_>>());
            assert_eq!(a.value * b.value, c.value);
            for x in [a, b, c] {
                assert_eq!(x.mac, key * x.value);
            }
        }
        Ok(())
    }

    #[test]
    fn consecutive_triples_differ() -> Result<(), PreprocessingError> {
        let mut dealer = dealers(2, DealerLimits::default()).remove(0);
        let first = dealer.next_triple()?;
        let second = dealer.next_triple()?;
        assert_ne!(first, second);
        assert_eq!(dealer.stats().triples, 2);
        Ok(())
    }

    #[test]
    fn bits_and_pipes_are_well_formed() -> Result<(), PreprocessingError> {
        let mut dealers = dealers(2, DealerLimits::default());
        for _ in 0..20 {
            let bits = dealers
                .iter_mut()
                .map(|d| d.next_bit())
                .collect::<Result<Vec<_>, _>>()?;
            let bit = open(&bits).value;
            assert!(bit == Fp::ZERO || bit == Fp::ONE);
        }
        let pipes = dealers
            .iter_mut()
            .map(|d| d.next_exp_pipe())
            .collect::<Result<Vec<_>, _>>()?;
        let opened: Vec<Fp> = (0..pipes[0].len())
            .map(|i| pipes.iter().map(|p| p[i].value).sum())
            .collect();
        assert_eq!(opened[0] * opened[1], Fp::ONE);
        for i in 2..opened.len() {
            assert_eq!(opened[i], opened[i - 1] * opened[1]);
        }
        Ok(())
    }

    #[test]
    fn only_owner_learns_the_mask() -> Result<(), PreprocessingError> {
        let mut dealers = dealers(3, DealerLimits::default());
        let masks = dealers
            .iter_mut()
            .map(|d| d.next_input_mask(1))
            .collect::<Result<Vec<_>, _>>()?;
        assert!(masks[0].mask.is_none());
        assert!(masks[2].mask.is_none());
        let r: Fp = masks.iter().map(|m| m.share.value).sum();
        assert_eq!(masks[1].mask, Some(r));
        Ok(())
    }

    #[test]
    fn limits_exhaust_the_dealer() {
        let limits = DealerLimits {
            triples: Some(1),
            ..Default::default()
        };
        let mut dealer = dealers(2, limits).remove(0);
        assert!(dealer.next_triple().is_ok());
        assert!(matches!(
            dealer.next_triple(),
            Err(PreprocessingError::Exhausted(MaterialKind::Triple))
        ));
        assert!(dealer.next_bit().is_ok());
    }

    #[test]
    fn dealer_rejects_unknown_party() {
        let config = DealerConfig::new([7; 32]);
        assert!(matches!(
            Dealer::new(&config, 2, 2),
            Err(PreprocessingError::UnknownParty {
                party: 2,
                parties: 2
            })
        ));
        assert!(Dealer::new(&config, 1, 2).is_ok());
    }
}

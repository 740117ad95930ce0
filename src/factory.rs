//! Constructors for the native SPDZ operations, used by circuit authors.
//!
//! Every constructor takes the handles it reads and writes and returns a leaf that is ready to be
//! composed with the nodes of [`crate::producer`]. Output handles are usually created with
//! [`SpdzFactory::sint`] or [`SpdzFactory::oint`] and stay unset until the leaf has been evaluated.

use rand::rng;

use crate::{
    data_types::{OInt, SInt, ShareElement},
    field::{Fp, MODULUS},
    native::{
        ClearExpPipeOp, ExpPipeOp, InputOp, LinearOp, LocalInversionOp, MultOp, OutputToAllOp,
        OutputToOp, RandomKind, RandomOp, SpdzContext, SpdzNative, SpdzNativeProtocol, Term,
    },
    producer::{BoxedProducer, Native},
};

/// A protocol tree whose leaves are SPDZ operations.
pub type SpdzProducer = BoxedProducer<SpdzNative>;

/// Creates the native operations of one party.
#[derive(Debug, Clone)]
pub struct SpdzFactory {
    ctx: SpdzContext,
}

fn leaf(op: impl SpdzNativeProtocol + 'static) -> SpdzProducer {
    Box::new(Native::new(Box::new(op) as SpdzNative))
}

impl SpdzFactory {
    /// A factory for the party described by `ctx`.
    pub fn new(ctx: SpdzContext) -> Self {
        Self { ctx }
    }

    /// The context of the party.
    pub fn context(&self) -> &SpdzContext {
        &self.ctx
    }

    /// A new, unassigned secret handle.
    pub fn sint(&self) -> SInt {
        SInt::uninit()
    }

    /// A new, unassigned public handle.
    pub fn oint(&self) -> OInt {
        OInt::uninit()
    }

    /// A public handle holding `value`.
    pub fn oint_from(&self, value: impl Into<Fp>) -> OInt {
        OInt::with_value(value.into())
    }

    /// A secret handle holding the public constant `value`, shared trivially.
    pub fn known(&self, value: impl Into<Fp>) -> SInt {
        SInt::with_share(ShareElement::known(
            value.into(),
            self.ctx.mac_key_share,
            self.ctx.party,
        ))
    }

    /// The constant `2^(b/2)` where `b` is the bit length of `(p - 1) / 2`.
    pub fn sqrt_of_max(&self) -> SInt {
        let bits = 128 - ((MODULUS - 1) / 2).leading_zeros();
        self.known(Fp::power_of_two(bits / 2))
    }

    /// A random public value, drawn locally by this party.
    pub fn random_public(&self) -> OInt {
        OInt::with_value(Fp::random(&mut rng()))
    }

    /// `out = sum(coefficient * x)`, computed locally.
    pub fn linear_combination(&self, terms: Vec<(Fp, SInt)>, out: &SInt) -> SpdzProducer {
        leaf(LinearOp {
            terms: terms
                .into_iter()
                .map(|(c, x)| Term::Secret(c, x))
                .collect(),
            out: out.clone(),
        })
    }

    /// `out = sum(xs)`, computed locally.
    pub fn sum(&self, xs: &[SInt], out: &SInt) -> SpdzProducer {
        let terms = xs.iter().map(|x| (Fp::ONE, x.clone())).collect();
        self.linear_combination(terms, out)
    }

    /// `out = a + b`.
    pub fn add(&self, a: &SInt, b: &SInt, out: &SInt) -> SpdzProducer {
        self.linear_combination(vec![(Fp::ONE, a.clone()), (Fp::ONE, b.clone())], out)
    }

    /// `out = a - b`.
    pub fn sub(&self, a: &SInt, b: &SInt, out: &SInt) -> SpdzProducer {
        self.linear_combination(vec![(Fp::ONE, a.clone()), (-Fp::ONE, b.clone())], out)
    }

    /// `out = a + b` for a public `b`.
    pub fn add_public(&self, a: &SInt, b: &OInt, out: &SInt) -> SpdzProducer {
        leaf(LinearOp {
            terms: vec![Term::Secret(Fp::ONE, a.clone()), Term::Public(Fp::ONE, b.clone())],
            out: out.clone(),
        })
    }

    /// `out = a - b` for a public `b`.
    pub fn sub_public(&self, a: &SInt, b: &OInt, out: &SInt) -> SpdzProducer {
        leaf(LinearOp {
            terms: vec![Term::Secret(Fp::ONE, a.clone()), Term::Public(-Fp::ONE, b.clone())],
            out: out.clone(),
        })
    }

    /// `out = a - b` for a public `a`.
    pub fn sub_from_public(&self, a: &OInt, b: &SInt, out: &SInt) -> SpdzProducer {
        leaf(LinearOp {
            terms: vec![Term::Public(Fp::ONE, a.clone()), Term::Secret(-Fp::ONE, b.clone())],
            out: out.clone(),
        })
    }

    /// `out = a * b`, one round.
    pub fn mult(&self, a: &SInt, b: &SInt, out: &SInt) -> SpdzProducer {
        leaf(MultOp::new(a.clone(), b.clone(), out.clone()))
    }

    /// `out = a * b` for a public `a`, computed locally.
    pub fn mult_public(&self, a: &OInt, b: &SInt, out: &SInt) -> SpdzProducer {
        leaf(LinearOp {
            terms: vec![Term::Scaled(a.clone(), b.clone())],
            out: out.clone(),
        })
    }

    /// Secret shares the `value` of party `owner` into `out`, one round.
    ///
    /// Only the owner needs to provide a value, the other parties pass `None`.
    pub fn input(&self, value: Option<Fp>, owner: usize, out: &SInt) -> SpdzProducer {
        leaf(InputOp {
            value,
            owner,
            out: out.clone(),
            mask: None,
        })
    }

    /// Opens `x` to all parties, one round.
    pub fn open(&self, x: &SInt, out: &OInt) -> SpdzProducer {
        leaf(OutputToAllOp {
            x: x.clone(),
            out: out.clone(),
            share: None,
        })
    }

    /// Opens `x` to party `target` only, one round. Other parties leave `out` unset.
    pub fn open_to(&self, x: &SInt, target: usize, out: &OInt) -> SpdzProducer {
        leaf(OutputToOp {
            x: x.clone(),
            target,
            out: out.clone(),
            masked: None,
        })
    }

    /// `out = x^-1` for a public `x`, failing for zero.
    pub fn local_invert(&self, x: &OInt, out: &OInt) -> SpdzProducer {
        leaf(LocalInversionOp {
            x: x.clone(),
            out: out.clone(),
        })
    }

    /// Assigns a random shared bit to `out`.
    pub fn random_bit(&self, out: &SInt) -> SpdzProducer {
        leaf(RandomOp {
            kind: RandomKind::Bit,
            out: out.clone(),
        })
    }

    /// Assigns a random shared field element to `out`.
    pub fn random_sint(&self, out: &SInt) -> SpdzProducer {
        leaf(RandomOp {
            kind: RandomKind::Element,
            out: out.clone(),
        })
    }

    /// Assigns a random exponentiation pipe `[r^-1, r, r^2, ...]` to `out`.
    pub fn exp_pipe(&self, out: &[SInt]) -> SpdzProducer {
        leaf(ExpPipeOp { out: out.to_vec() })
    }

    /// Assigns the clear exponentiation pipe `[x^-1, x, x^2, ...]` of a public `x` to `out`.
    pub fn exp_from_public(&self, x: &OInt, out: &[OInt]) -> SpdzProducer {
        leaf(ClearExpPipeOp {
            x: x.clone(),
            out: out.to_vec(),
        })
    }
}

//! Native (atomic) SPDZ operations, the leaves of every protocol tree.
//!
//! A native operation is evaluated in steps. Step 0 runs when the operation is scheduled, every
//! further step runs after the evaluator has exchanged the messages queued in the previous step.
//! Local operations finish in step 0, operations that open values finish in step 1.

use std::{collections::VecDeque, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    data_types::{OInt, SInt, ShareElement},
    field::Fp,
    protocol::{Error, MpcError},
    supplier::{InputMask, PreprocessingError, Supplier, Triple},
};

/// The per-run context of one party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpdzContext {
    /// The index of this party.
    pub party: usize,
    /// The total number of parties.
    pub parties: usize,
    /// This party's share of the global MAC key.
    pub mac_key_share: Fp,
}

impl SpdzContext {
    /// Iterates over the indices of all other parties.
    pub fn others(&self) -> impl Iterator<Item = usize> + use<> {
        let own = self.party;
        (0..self.parties).filter(move |p| *p != own)
    }
}

/// Whether a native operation needs another step after the next message exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStatus {
    /// The operation has assigned all of its outputs.
    IsDone,
    /// The operation queued messages and continues after they have been exchanged.
    HasMoreRounds,
}

/// Values opened since the last MAC check.
#[derive(Debug, Clone, Default)]
pub struct OpenedValues {
    /// Each opened value together with this party's share of its MAC.
    pub(crate) values: Vec<(Fp, Fp)>,
    /// Public values that a single party sent to everyone and that all parties must agree on.
    pub(crate) broadcasts: Vec<Fp>,
}

impl OpenedValues {
    /// The number of values awaiting a MAC check.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has been opened since the last check.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.broadcasts.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.broadcasts.clear();
    }
}

/// Everything a native operation can access while it is evaluated.
pub struct StepContext<'a> {
    spdz: SpdzContext,
    supplier: &'a mut dyn Supplier,
    outbox: Vec<Vec<Fp>>,
    inbox: Vec<VecDeque<Fp>>,
    pub(crate) opened: OpenedValues,
}

impl fmt::Debug for StepContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("spdz", &self.spdz)
            .field("opened", &self.opened.len())
            .finish_non_exhaustive()
    }
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(spdz: SpdzContext, supplier: &'a mut dyn Supplier) -> Self {
        Self {
            spdz,
            supplier,
            outbox: vec![vec![]; spdz.parties],
            inbox: vec![VecDeque::new(); spdz.parties],
            opened: OpenedValues::default(),
        }
    }

    /// The context of this party.
    pub fn spdz(&self) -> &SpdzContext {
        &self.spdz
    }

    /// The preprocessing supplier of this party.
    pub fn supplier(&mut self) -> &mut dyn Supplier {
        &mut *self.supplier
    }

    /// Queues `value` for all other parties.
    pub fn send_to_others(&mut self, value: Fp) {
        for p in self.spdz.others() {
            self.outbox[p].push(value);
        }
    }

    /// Takes the next value received from `party` in the last exchange.
    pub fn recv_from(&mut self, party: usize) -> Result<Fp, Error> {
        self.inbox
            .get_mut(party)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| MpcError::MissingShare { party }.into())
    }

    /// Sums this party's value share with the value shares received from all other parties.
    pub fn reconstruct(&mut self, own: Fp) -> Result<Fp, Error> {
        let mut value = own;
        for p in self.spdz.others() {
            value += self.recv_from(p)?;
        }
        Ok(value)
    }

    /// Records an opened value for the next MAC check.
    pub fn record_opened(&mut self, value: Fp, mac_share: Fp) {
        self.opened.values.push((value, mac_share));
    }

    /// Records a value that all parties must have received identically.
    pub fn record_broadcast(&mut self, value: Fp) {
        self.opened.broadcasts.push(value);
    }

    /// Takes the queued messages, one per party (the entry for this party is empty).
    pub(crate) fn take_outbox(&mut self) -> Vec<Vec<Fp>> {
        let parties = self.spdz.parties;
        std::mem::replace(&mut self.outbox, vec![vec![]; parties])
    }

    /// Whether any message is queued.
    pub(crate) fn has_outgoing(&self) -> bool {
        self.outbox.iter().any(|msg| !msg.is_empty())
    }

    /// Delivers the messages of an exchange, all messages of the previous one must be consumed.
    pub(crate) fn deliver(&mut self, received: Vec<Vec<Fp>>) -> Result<(), Error> {
        self.ensure_consumed()?;
        self.inbox = received.into_iter().map(VecDeque::from).collect();
        Ok(())
    }

    pub(crate) fn ensure_consumed(&self) -> Result<(), Error> {
        match self.inbox.iter().position(|queue| !queue.is_empty()) {
            Some(party) => Err(MpcError::UnexpectedShares { party }.into()),
            None => Ok(()),
        }
    }

    fn add_public(&self, share: ShareElement, constant: Fp) -> ShareElement {
        share.add_public(constant, self.spdz.mac_key_share, self.spdz.party)
    }
}

/// An atomic operation of the SPDZ suite.
pub trait SpdzNativeProtocol: fmt::Debug + Send {
    /// Runs step `step` of the operation.
    fn evaluate(&mut self, step: usize, ctx: &mut StepContext<'_>)
    -> Result<EvaluationStatus, Error>;
}

/// The native operation type the SPDZ suite plugs into the protocol engine.
pub type SpdzNative = Box<dyn SpdzNativeProtocol>;

/// One summand of a [`LinearOp`].
#[derive(Debug, Clone)]
pub(crate) enum Term {
    /// `coefficient * x` for a secret `x`.
    Secret(Fp, SInt),
    /// `coefficient * c` for a public `c`.
    Public(Fp, OInt),
    /// `c * x` for a public `c` and a secret `x`.
    Scaled(OInt, SInt),
}

/// Computes a linear combination of secret and public values without communication.
///
/// Add, subtract, the public variants and multiplication by a public value are all instances.
#[derive(Debug)]
pub(crate) struct LinearOp {
    pub(crate) terms: Vec<Term>,
    pub(crate) out: SInt,
}

impl SpdzNativeProtocol for LinearOp {
    fn evaluate(&mut self, _: usize, ctx: &mut StepContext<'_>) -> Result<EvaluationStatus, Error> {
        let mut share = ShareElement::default();
        let mut constant = Fp::ZERO;
        for term in &self.terms {
            match term {
                Term::Secret(coefficient, x) => share = share + x.share()? * *coefficient,
                Term::Public(coefficient, c) => constant += *coefficient * c.value()?,
                Term::Scaled(c, x) => share = share + x.share()? * c.value()?,
            }
        }
        self.out.set(ctx.add_public(share, constant));
        Ok(EvaluationStatus::IsDone)
    }
}

/// Multiplies two secret values using a Beaver triple.
#[derive(Debug)]
pub(crate) struct MultOp {
    pub(crate) x: SInt,
    pub(crate) y: SInt,
    pub(crate) out: SInt,
    pub(crate) opening: Option<(Triple, ShareElement, ShareElement)>,
}

impl MultOp {
    pub(crate) fn new(x: SInt, y: SInt, out: SInt) -> Self {
        Self {
            x,
            y,
            out,
            opening: None,
        }
    }
}

impl SpdzNativeProtocol for MultOp {
    fn evaluate(
        &mut self,
        step: usize,
        ctx: &mut StepContext<'_>,
    ) -> Result<EvaluationStatus, Error> {
        match (step, self.opening) {
            (0, _) => {
                let triple = ctx.supplier().next_triple()?;
                let d = self.x.share()? - triple.a;
                let e = self.y.share()? - triple.b;
                ctx.send_to_others(d.value);
                ctx.send_to_others(e.value);
                self.opening = Some((triple, d, e));
                Ok(EvaluationStatus::HasMoreRounds)
            }
            (_, Some((triple, d_share, e_share))) => {
                let mut d = d_share.value;
                let mut e = e_share.value;
                for p in ctx.spdz().others() {
                    d += ctx.recv_from(p)?;
                    e += ctx.recv_from(p)?;
                }
                ctx.record_opened(d, d_share.mac);
                ctx.record_opened(e, e_share.mac);
                let z = triple.c + triple.b * d + triple.a * e;
                self.out.set(ctx.add_public(z, d * e));
                Ok(EvaluationStatus::IsDone)
            }
            (_, None) => Err(Error::UninitializedValue("triple opening")),
        }
    }
}

/// Secret shares a value known to one party, using an input mask owned by that party.
#[derive(Debug)]
pub(crate) struct InputOp {
    pub(crate) value: Option<Fp>,
    pub(crate) owner: usize,
    pub(crate) out: SInt,
    pub(crate) mask: Option<InputMask>,
}

impl SpdzNativeProtocol for InputOp {
    fn evaluate(
        &mut self,
        step: usize,
        ctx: &mut StepContext<'_>,
    ) -> Result<EvaluationStatus, Error> {
        let party = ctx.spdz().party;
        if self.owner >= ctx.spdz().parties {
            return Err(MpcError::PartyDoesNotExist(self.owner).into());
        }
        match (step, self.mask) {
            (0, _) => {
                let mask = ctx.supplier().next_input_mask(self.owner)?;
                if party == self.owner {
                    let value = self.value.ok_or(MpcError::MissingInput(self.owner))?;
                    let r = mask
                        .mask
                        .ok_or(PreprocessingError::MissingMask(self.owner))?;
                    let epsilon = value - r;
                    ctx.send_to_others(epsilon);
                    ctx.record_broadcast(epsilon);
                    self.out.set(ctx.add_public(mask.share, epsilon));
                }
                self.mask = Some(mask);
                Ok(EvaluationStatus::HasMoreRounds)
            }
            (_, Some(mask)) => {
                if party != self.owner {
                    let epsilon = ctx.recv_from(self.owner)?;
                    ctx.record_broadcast(epsilon);
                    self.out.set(ctx.add_public(mask.share, epsilon));
                }
                Ok(EvaluationStatus::IsDone)
            }
            (_, None) => Err(Error::UninitializedValue("input mask")),
        }
    }
}

/// Opens a secret value to all parties.
#[derive(Debug)]
pub(crate) struct OutputToAllOp {
    pub(crate) x: SInt,
    pub(crate) out: OInt,
    pub(crate) share: Option<ShareElement>,
}

impl SpdzNativeProtocol for OutputToAllOp {
    fn evaluate(
        &mut self,
        step: usize,
        ctx: &mut StepContext<'_>,
    ) -> Result<EvaluationStatus, Error> {
        match (step, self.share) {
            (0, _) => {
                let share = self.x.share()?;
                ctx.send_to_others(share.value);
                self.share = Some(share);
                Ok(EvaluationStatus::HasMoreRounds)
            }
            (_, Some(share)) => {
                let value = ctx.reconstruct(share.value)?;
                ctx.record_opened(value, share.mac);
                self.out.set(value);
                Ok(EvaluationStatus::IsDone)
            }
            (_, None) => Err(Error::UninitializedValue("output share")),
        }
    }
}

/// Opens a secret value to a single party.
///
/// The value is masked with an input mask known only to the target, so the other parties learn
/// nothing from the opened difference while the opening can still be MAC checked by everyone.
#[derive(Debug)]
pub(crate) struct OutputToOp {
    pub(crate) x: SInt,
    pub(crate) target: usize,
    pub(crate) out: OInt,
    pub(crate) masked: Option<(InputMask, ShareElement)>,
}

impl SpdzNativeProtocol for OutputToOp {
    fn evaluate(
        &mut self,
        step: usize,
        ctx: &mut StepContext<'_>,
    ) -> Result<EvaluationStatus, Error> {
        if self.target >= ctx.spdz().parties {
            return Err(MpcError::PartyDoesNotExist(self.target).into());
        }
        match (step, self.masked) {
            (0, _) => {
                let mask = ctx.supplier().next_input_mask(self.target)?;
                let epsilon = self.x.share()? - mask.share;
                ctx.send_to_others(epsilon.value);
                self.masked = Some((mask, epsilon));
                Ok(EvaluationStatus::HasMoreRounds)
            }
            (_, Some((mask, epsilon_share))) => {
                let epsilon = ctx.reconstruct(epsilon_share.value)?;
                ctx.record_opened(epsilon, epsilon_share.mac);
                if ctx.spdz().party == self.target {
                    let r = mask
                        .mask
                        .ok_or(PreprocessingError::MissingMask(self.target))?;
                    self.out.set(epsilon + r);
                }
                Ok(EvaluationStatus::IsDone)
            }
            (_, None) => Err(Error::UninitializedValue("output mask")),
        }
    }
}

/// Inverts a public value locally.
#[derive(Debug)]
pub(crate) struct LocalInversionOp {
    pub(crate) x: OInt,
    pub(crate) out: OInt,
}

impl SpdzNativeProtocol for LocalInversionOp {
    fn evaluate(&mut self, _: usize, _: &mut StepContext<'_>) -> Result<EvaluationStatus, Error> {
        let inverse = self.x.value()?.inverse().ok_or(Error::ZeroInversion)?;
        self.out.set(inverse);
        Ok(EvaluationStatus::IsDone)
    }
}

/// The kind of random secret drawn by a [`RandomOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RandomKind {
    /// A uniformly random bit.
    Bit,
    /// A uniformly random field element.
    Element,
}

/// Assigns a fresh random secret value drawn from preprocessing.
#[derive(Debug)]
pub(crate) struct RandomOp {
    pub(crate) kind: RandomKind,
    pub(crate) out: SInt,
}

impl SpdzNativeProtocol for RandomOp {
    fn evaluate(&mut self, _: usize, ctx: &mut StepContext<'_>) -> Result<EvaluationStatus, Error> {
        let share = match self.kind {
            RandomKind::Bit => ctx.supplier().next_bit()?,
            RandomKind::Element => ctx.supplier().next_triple()?.a,
        };
        self.out.set(share);
        Ok(EvaluationStatus::IsDone)
    }
}

/// Assigns the entries of a fresh exponentiation pipe `[r^-1, r, r^2, ...]`.
#[derive(Debug)]
pub(crate) struct ExpPipeOp {
    pub(crate) out: Vec<SInt>,
}

impl SpdzNativeProtocol for ExpPipeOp {
    fn evaluate(&mut self, _: usize, ctx: &mut StepContext<'_>) -> Result<EvaluationStatus, Error> {
        let pipe = ctx.supplier().next_exp_pipe()?;
        if pipe.len() < self.out.len() {
            return Err(PreprocessingError::PipeTooShort {
                available: pipe.len(),
                requested: self.out.len(),
            }
            .into());
        }
        for (out, share) in self.out.iter().zip(pipe) {
            out.set(share);
        }
        Ok(EvaluationStatus::IsDone)
    }
}

/// Computes the clear pipe `[x^-1, x, x^2, ...]` of a public value.
#[derive(Debug)]
pub(crate) struct ClearExpPipeOp {
    pub(crate) x: OInt,
    pub(crate) out: Vec<OInt>,
}

impl SpdzNativeProtocol for ClearExpPipeOp {
    fn evaluate(&mut self, _: usize, _: &mut StepContext<'_>) -> Result<EvaluationStatus, Error> {
        let x = self.x.value()?;
        let mut outs = self.out.iter();
        if let Some(first) = outs.next() {
            first.set(x.inverse().ok_or(Error::ZeroInversion)?);
        }
        let mut power = Fp::ONE;
        for out in outs {
            power *= x;
            out.set(power);
        }
        Ok(EvaluationStatus::IsDone)
    }
}

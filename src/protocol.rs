//! The per-party evaluator that drives a protocol tree, exchanging messages via channels.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::{runtime::Runtime, task};
use tracing::{Level, debug, instrument};

use crate::{
    channel::{self, Channel, SimpleChannel, exchange},
    config::{Config, MacCheckPolicy},
    factory::{SpdzFactory, SpdzProducer},
    mac_check::mac_check,
    native::{EvaluationStatus, SpdzContext, SpdzNative, StepContext},
    producer::ProtocolProducer,
    supplier::{Dealer, DealerConfig, DealerStats, PreprocessingError, Supplier},
};

/// A custom error type for MPC computation and communication.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error("channel error: {0}")]
    Channel(#[from] channel::Error),
    /// The configuration or the shape of a circuit is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A handle was read before the operation producing it had run.
    #[error("{0} was read before it was assigned")]
    UninitializedValue(&'static str),
    /// A public zero value was inverted.
    #[error("cannot invert zero")]
    ZeroInversion,
    /// Preprocessed material could not be drawn.
    #[error("preprocessing error: {0}")]
    Preprocessing(#[from] PreprocessingError),
    /// Caused by the core MPC protocol computation.
    #[error("MPC error: {0}")]
    Mpc(#[from] MpcError),
    /// The protocol tree is not exhausted, but has no operation ready.
    #[error("the protocol tree is not exhausted but emitted no operations")]
    Stalled,
    /// A party's task could not be completed.
    #[error("party task failed: {0}")]
    Task(String),
}

/// A custom error type for all SPDZ operations.
#[derive(Debug, thiserror::Error)]
pub enum MpcError {
    /// The opened values do not match their MACs.
    #[error("the MAC check failed")]
    MacCheckFailed,
    /// The specified party opened a value that does not match its commitment.
    #[error("party {0} did not open its commitment")]
    CommitmentMismatch(usize),
    /// The specified party saw different opened or broadcast values.
    #[error("party {0} received inconsistent opened values")]
    InconsistentBroadcast(usize),
    /// The specified party sent fewer shares than expected.
    #[error("missing share from party {party}")]
    MissingShare {
        /// The party that should have sent the share.
        party: usize,
    },
    /// The specified party sent more shares than expected.
    #[error("unexpected shares from party {party}")]
    UnexpectedShares {
        /// The party that sent the shares.
        party: usize,
    },
    /// The owner of an input did not provide a value.
    #[error("party {0} provided no value for its input")]
    MissingInput(usize),
    /// The specified party does not exist.
    #[error("party {0} does not exist")]
    PartyDoesNotExist(usize),
}

/// Statistics of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// The number of message exchanges needed to evaluate all native operations.
    pub rounds: usize,
    /// The number of evaluated native operations.
    pub native_ops: usize,
    /// The number of MAC checks.
    pub mac_checks: usize,
    /// The number of opened values verified by the MAC checks.
    pub opened_values: usize,
}

/// Executes the protocol tree `root` for one party.
///
/// Every output is MAC checked before this function returns successfully. If it returns an error,
/// the values of all handles written during the run must be discarded.
#[instrument(level = Level::DEBUG, skip_all, fields(party = ctx.party), err)]
pub async fn mpc<P: ProtocolProducer<SpdzNative> + ?Sized>(
    channel: &mut impl Channel,
    ctx: &SpdzContext,
    supplier: &mut impl Supplier,
    root: &mut P,
    config: &Config,
) -> Result<RunStats, Error> {
    config.validate()?;
    if ctx.party >= ctx.parties {
        return Err(MpcError::PartyDoesNotExist(ctx.party).into());
    }
    let mut stats = RunStats::default();
    let mut step_ctx = StepContext::new(*ctx, supplier);

    while !root.is_exhausted() {
        let mut batch = vec![];
        let emitted = root.advance(config.batch_size, &mut batch)?;
        if emitted == 0 {
            if root.is_exhausted() {
                break;
            }
            return Err(Error::Stalled);
        }
        debug!(size = emitted, "evaluating batch");
        stats.native_ops += emitted;
        stats.rounds += evaluate_batch(channel, &mut step_ctx, batch).await?;

        let pending = step_ctx.opened.len();
        let check = match config.mac_check {
            MacCheckPolicy::EveryRound => !step_ctx.opened.is_empty(),
            MacCheckPolicy::Batched { threshold } => pending >= threshold,
            MacCheckPolicy::AtEnd => false,
        };
        if check {
            mac_check(channel, ctx, &mut step_ctx.opened).await?;
            stats.mac_checks += 1;
            stats.opened_values += pending;
        }
    }
    if !step_ctx.opened.is_empty() {
        let pending = step_ctx.opened.len();
        mac_check(channel, ctx, &mut step_ctx.opened).await?;
        stats.mac_checks += 1;
        stats.opened_values += pending;
    }
    debug!(?stats, "protocol tree exhausted");
    Ok(stats)
}

/// Evaluates all steps of a batch and returns the number of message exchanges.
async fn evaluate_batch(
    channel: &mut impl Channel,
    ctx: &mut StepContext<'_>,
    mut pending: Vec<SpdzNative>,
) -> Result<usize, Error> {
    let (party, parties) = (ctx.spdz().party, ctx.spdz().parties);
    let mut step = 0;
    loop {
        let mut next = vec![];
        for mut op in pending {
            if op.evaluate(step, ctx)? == EvaluationStatus::HasMoreRounds {
                next.push(op);
            }
        }
        ctx.ensure_consumed()?;
        if next.is_empty() {
            debug_assert!(!ctx.has_outgoing(), "finished operations left messages unsent");
            return Ok(step);
        }
        let msgs = ctx.take_outbox();
        debug_assert_eq!(msgs.len(), parties);
        let received = exchange(channel, party, "shares", msgs).await?;
        ctx.deliver(received)?;
        pending = next;
        step += 1;
    }
}

/// The result of one party in a simulated run.
#[derive(Debug)]
pub struct PartyResult<T> {
    /// Whatever the party's builder returned next to its protocol tree, usually output handles.
    pub output: T,
    /// The statistics of the party's run.
    pub stats: RunStats,
    /// The preprocessed material consumed by the party.
    pub preprocessing: DealerStats,
}

/// Simulates the multi party computation with `parties` parties and a trusted dealer.
///
/// `build` is called once per party with the party's factory and returns the party's protocol
/// tree together with a value (typically the output handles) that is returned after the run.
pub fn simulate_mpc<T, F>(
    parties: usize,
    config: &Config,
    dealer: &DealerConfig,
    build: F,
) -> Result<Vec<PartyResult<T>>, Error>
where
    T: Send + 'static,
    F: Fn(&SpdzFactory) -> Result<(SpdzProducer, T), Error>,
{
    config.validate()?;
    let tokio = Runtime::new().expect("Could not start tokio runtime");
    let channels = SimpleChannel::channels(parties);
    let mut runs = vec![];
    for (party, channel) in channels.into_iter().enumerate() {
        let supplier = Dealer::new(dealer, party, parties)?;
        let ctx = SpdzContext {
            party,
            parties,
            mac_key_share: supplier.mac_key_share(),
        };
        let (root, output) = build(&SpdzFactory::new(ctx))?;
        runs.push((ctx, channel, supplier, root, output));
    }
    tokio.block_on(async {
        let handles = runs
            .into_iter()
            .map(|(ctx, mut channel, mut supplier, mut root, output)| {
                let config = *config;
                task::spawn(async move {
                    let stats = mpc(&mut channel, &ctx, &mut supplier, &mut root, &config).await?;
                    Ok::<_, Error>(PartyResult {
                        output,
                        stats,
                        preprocessing: supplier.stats(),
                    })
                })
            })
            .collect::<Vec<_>>();
        let mut results = vec![];
        let mut channel_error = None;
        let mut other_error = None;
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                // a failing party closes its channels, the others only see the closed channels
                Ok(Err(e @ Error::Channel(_))) => {
                    channel_error.get_or_insert(e);
                }
                Ok(Err(e)) => {
                    other_error.get_or_insert(e);
                }
                Err(e) => {
                    other_error.get_or_insert(Error::Task(e.to_string()));
                }
            }
        }
        match other_error.or(channel_error) {
            Some(e) => Err(e),
            None => Ok(results),
        }
    })
}

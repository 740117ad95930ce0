//! Batched verification of opened values against their MACs.
//!
//! All values opened since the last check are combined into a single random linear combination,
//! whose coefficients come from a commit-and-open coin toss. Each party then commits to its share
//! `sigma_i = sum(r_j * m_ij) - key_i * sum(r_j * a_j)` and opens it, the check passes iff the
//! opened shares sum to zero.

use rand::{SeedableRng, random};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use crate::{
    channel::{Channel, unverified_broadcast},
    field::Fp,
    native::{OpenedValues, SpdzContext},
    protocol::{Error, MpcError},
};

/// Represents a cryptographic commitment as a fixed-size 32-byte array (a BLAKE3 hash).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
struct Commitment([u8; 32]);

/// Commits to a value using the BLAKE3 cryptographic hash function.
/// This is not a general-purpose commitment scheme, the input value is assumed to have high entropy.
fn commit(value: &[u8]) -> Commitment {
    Commitment(blake3::hash(value).into())
}

/// Verifies if a given value matches a previously generated commitment.
fn open_commitment(commitment: &Commitment, value: &[u8]) -> bool {
    blake3::hash(value).as_bytes() == &commitment.0
}

/// Binds a 32 byte seed and a payload to the party that sent them.
fn with_id(seed: &[u8; 32], payload: &[u8], party: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(34 + payload.len());
    buf.extend_from_slice(seed);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&(party as u16).to_be_bytes());
    buf
}

/// Commits to `payload`, blinded by a fresh seed, and opens it to everyone once all commitments
/// are known. Returns the payloads of all parties.
async fn commit_and_open(
    channel: &mut impl Channel,
    spdz: &SpdzContext,
    phase: &str,
    payload: [u8; 16],
) -> Result<Vec<([u8; 32], [u8; 16])>, Error> {
    let (i, n) = (spdz.party, spdz.parties);
    let blinder = random::<[u8; 32]>();
    let commitment = commit(&with_id(&blinder, &payload, i));
    let commitments = unverified_broadcast(channel, i, n, phase, &commitment).await?;
    let opened = unverified_broadcast(channel, i, n, phase, &(blinder, payload)).await?;
    for (k, (blinder, payload)) in opened.iter().enumerate() {
        if !open_commitment(&commitments[k], &with_id(blinder, payload, k)) {
            return Err(MpcError::CommitmentMismatch(k).into());
        }
    }
    Ok(opened)
}

/// Multi-party coin tossing, every party contributes to the seed of the returned RNG.
pub(crate) async fn shared_rng(
    channel: &mut impl Channel,
    spdz: &SpdzContext,
) -> Result<ChaCha20Rng, Error> {
    let contribution = random::<[u8; 16]>();
    let opened = commit_and_open(channel, spdz, "RNG comm", contribution).await?;
    let mut hasher = blake3::Hasher::new();
    for (_, contribution) in &opened {
        hasher.update(contribution);
    }
    Ok(ChaCha20Rng::from_seed(hasher.finalize().into()))
}

fn digest(opened: &OpenedValues) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for (value, _) in &opened.values {
        hasher.update(&value.as_u128().to_le_bytes());
    }
    hasher.update(&(opened.broadcasts.len() as u64).to_le_bytes());
    for value in &opened.broadcasts {
        hasher.update(&value.as_u128().to_le_bytes());
    }
    hasher.finalize().into()
}

/// Checks all opened values against their MACs and clears them.
///
/// Fails if any party saw different opened values or sent inconsistent inputs, or if the MACs do
/// not match the opened values.
#[instrument(level = Level::DEBUG, skip_all, fields(party = spdz.party, values = opened.len()), err)]
pub(crate) async fn mac_check(
    channel: &mut impl Channel,
    spdz: &SpdzContext,
    opened: &mut OpenedValues,
) -> Result<(), Error> {
    let (i, n) = (spdz.party, spdz.parties);

    let own_digest = digest(opened);
    let digests = unverified_broadcast(channel, i, n, "opened digest", &own_digest).await?;
    if let Some(k) = digests.iter().position(|d| *d != own_digest) {
        return Err(MpcError::InconsistentBroadcast(k).into());
    }

    let mut rng = shared_rng(channel, spdz).await?;
    let mut combined_value = Fp::ZERO;
    let mut combined_mac = Fp::ZERO;
    for (value, mac) in &opened.values {
        let r = Fp::random(&mut rng);
        combined_value += r * *value;
        combined_mac += r * *mac;
    }
    let sigma = combined_mac - spdz.mac_key_share * combined_value;

    let opened_sigmas =
        commit_and_open(channel, spdz, "MAC check", sigma.as_u128().to_le_bytes()).await?;
    let total: Fp = opened_sigmas
        .iter()
        .map(|(_, sigma)| Fp::new(u128::from_le_bytes(*sigma)))
        .sum();
    if !total.is_zero() {
        return Err(MpcError::MacCheckFailed.into());
    }
    debug!(checked = opened.len(), "MAC check passed");
    opened.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::channel::SimpleChannel;

    #[test]
    fn commitments_open_only_to_their_value() {
        let seed = [1; 32];
        let commitment = commit(&with_id(&seed, b"payload", 0));
        assert!(open_commitment(&commitment, &with_id(&seed, b"payload", 0)));
        assert!(!open_commitment(&commitment, &with_id(&seed, b"payload", 1)));
        assert!(!open_commitment(&commitment, &with_id(&seed, b"paylaod", 0)));
    }

    #[tokio::test]
    async fn shared_rng_is_shared() -> Result<(), Error> {
        let [mut a, mut b]: [SimpleChannel; 2] = SimpleChannel::channels(2)
            .try_into()
            .expect("parties is 2");
        let ctx = |party| SpdzContext {
            party,
            parties: 2,
            mac_key_share: Fp::ZERO,
        };
        let (ctx_a, ctx_b) = (ctx(0), ctx(1));
        let (mut rng_a, mut rng_b) =
            tokio::try_join!(shared_rng(&mut a, &ctx_a), shared_rng(&mut b, &ctx_b))?;
        assert_eq!(rng_a.random::<u128>(), rng_b.random::<u128>());
        Ok(())
    }
}

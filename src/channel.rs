//! A communication channel used to send/receive messages to/from another party.

use std::{fmt, future::Future, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::mpsc::{Receiver, Sender, channel, error::SendError},
    time::timeout,
};
use tracing::trace;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug, thiserror::Error)]
#[error("channel error during {phase}: {reason:?}")]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    SendError(String),
    /// The message could not be serialized (before sending it out).
    SerdeError(String),
}

/// A communication channel used to send/receive messages to/from another party.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index (must be between `0..participants`).
    fn send_bytes_to(
        &mut self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a response from the party with the given index (must be between `0..participants`).
    fn recv_bytes_from(
        &mut self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// Serializes and sends an MPC message to the other party.
pub(crate) async fn send_to(
    channel: &mut impl Channel,
    party: usize,
    phase: &str,
    msg: &impl Serialize,
) -> Result<(), Error> {
    let msg = bincode::serialize(msg).map_err(|e| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    channel.send_bytes_to(party, msg).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::SendError(format!("{e:?}")),
    })
}

/// Receives and deserializes an MPC message from the other party.
pub(crate) async fn recv_from<T: DeserializeOwned>(
    channel: &mut impl Channel,
    party: usize,
    phase: &str,
) -> Result<T, Error> {
    let msg = channel.recv_bytes_from(party).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::RecvError(format!("{e:?}")),
    })?;
    bincode::deserialize(&msg).map_err(|e| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })
}

/// Sends `msgs[p]` to every other party `p` and returns the messages received from them.
///
/// The entry for `own` is left untouched and returned as an empty message.
pub(crate) async fn exchange<T: Serialize + DeserializeOwned + Default>(
    channel: &mut impl Channel,
    own: usize,
    phase: &str,
    msgs: Vec<T>,
) -> Result<Vec<T>, Error> {
    let parties = msgs.len();
    for (p, msg) in msgs.iter().enumerate() {
        if p != own {
            send_to(channel, p, phase, msg).await?;
        }
    }
    let mut received = Vec::with_capacity(parties);
    for p in 0..parties {
        if p == own {
            received.push(T::default());
        } else {
            received.push(recv_from(channel, p, phase).await?);
        }
    }
    Ok(received)
}

/// Sends the same message to all other parties and collects theirs (without consistency checks).
///
/// The returned Vec contains `msg` itself at index `own`.
pub(crate) async fn unverified_broadcast<T: Serialize + DeserializeOwned + Clone>(
    channel: &mut impl Channel,
    own: usize,
    parties: usize,
    phase: &str,
    msg: &T,
) -> Result<Vec<T>, Error> {
    for p in (0..parties).filter(|p| *p != own) {
        send_to(channel, p, phase, msg).await?;
    }
    let mut received = Vec::with_capacity(parties);
    for p in 0..parties {
        if p == own {
            received.push(msg.clone());
        } else {
            received.push(recv_from(channel, p, phase).await?);
        }
    }
    Ok(received)
}

/// A simple asynchronous channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Receiver<Vec<u8>>>>,
}

impl SimpleChannel {
    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels = vec![];
        for _ in 0..parties {
            let mut s = vec![];
            let mut r = vec![];
            for _ in 0..parties {
                s.push(None);
                r.push(None);
            }
            channels.push(SimpleChannel { s, r });
        }
        for a in 0..parties {
            for b in (a + 1)..parties {
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].s[a] = Some(send_b_to_a);
                channels[a].r[b] = Some(recv_b_to_a);
                channels[b].r[a] = Some(recv_a_to_b);
            }
        }
        channels
    }
}

#[derive(Debug)]
/// The error raised by `recv` calls of a [`SimpleChannel`].
pub enum AsyncRecvError {
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
    /// There is no channel to the specified party.
    NoSuchParty(usize),
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncSendError {
    /// The receiving end has been dropped.
    Closed(SendError<Vec<u8>>),
    /// There is no channel to the specified party.
    NoSuchParty(usize),
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(&mut self, p: usize, msg: Vec<u8>) -> Result<(), AsyncSendError> {
        trace!(party = p, bytes = msg.len(), "sending msg");
        let Some(sender) = self.s.get(p).and_then(Option::as_ref) else {
            return Err(AsyncSendError::NoSuchParty(p));
        };
        sender.send(msg).await.map_err(AsyncSendError::Closed)
    }

    async fn recv_bytes_from(&mut self, p: usize) -> Result<Vec<u8>, AsyncRecvError> {
        let Some(receiver) = self.r.get_mut(p).and_then(Option::as_mut) else {
            return Err(AsyncRecvError::NoSuchParty(p));
        };
        match timeout(Duration::from_secs(10 * 60), receiver.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}

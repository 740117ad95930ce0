//! Composition of native operations into protocol trees.
//!
//! A protocol tree is driven by repeatedly calling [`ProtocolProducer::advance`], which appends the
//! native operations that are ready to run in the next communication round to a batch. The runtime
//! evaluates the whole batch before it calls `advance` again, so an operation that depends on the
//! output of another one is only emitted once that output exists.
//!
//! The engine is generic over the native operation type `N` and knows nothing about the protocol
//! suite that evaluates the leaves.

use std::fmt;

use crate::protocol::Error;

/// A node of a protocol tree that emits native operations round by round.
pub trait ProtocolProducer<N>: Send {
    /// Whether the node has emitted all of its operations.
    ///
    /// Once a node is exhausted it stays exhausted, further calls to `advance` emit nothing.
    fn is_exhausted(&self) -> bool;

    /// Appends at most `capacity` operations that are ready to run to `batch`.
    ///
    /// Returns the number of appended operations.
    fn advance(&mut self, capacity: usize, batch: &mut Vec<N>) -> Result<usize, Error>;
}

/// A type-erased protocol tree.
pub type BoxedProducer<N> = Box<dyn ProtocolProducer<N>>;

impl<N, P: ProtocolProducer<N> + ?Sized> ProtocolProducer<N> for Box<P> {
    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }

    fn advance(&mut self, capacity: usize, batch: &mut Vec<N>) -> Result<usize, Error> {
        (**self).advance(capacity, batch)
    }
}

/// A leaf holding a single native operation, which is emitted exactly once.
#[derive(Debug)]
pub struct Native<N>(Option<N>);

impl<N> Native<N> {
    /// Wraps a native operation.
    pub fn new(op: N) -> Self {
        Native(Some(op))
    }
}

impl<N: Send> ProtocolProducer<N> for Native<N> {
    fn is_exhausted(&self) -> bool {
        self.0.is_none()
    }

    fn advance(&mut self, capacity: usize, batch: &mut Vec<N>) -> Result<usize, Error> {
        if capacity == 0 {
            return Ok(0);
        }
        match self.0.take() {
            Some(op) => {
                batch.push(op);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

/// Runs its children one after another.
///
/// Only the current child is advanced. The node moves on to the next child at the beginning of a
/// later `advance` call, after the batch holding the last operations of the current child has been
/// evaluated. A child that is already exhausted (or empty) is skipped immediately.
pub struct Sequential<N> {
    children: Vec<BoxedProducer<N>>,
    current: usize,
}

impl<N> Sequential<N> {
    /// An empty sequence.
    pub fn new() -> Self {
        Self {
            children: vec![],
            current: 0,
        }
    }

    /// Appends a child that runs after all previously appended ones.
    pub fn append(&mut self, child: impl ProtocolProducer<N> + 'static) {
        self.children.push(Box::new(child));
    }

    /// Appends a child and returns the sequence, for chaining.
    pub fn then(mut self, child: impl ProtocolProducer<N> + 'static) -> Self {
        self.append(child);
        self
    }
}

impl<N> Default for Sequential<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> From<Vec<BoxedProducer<N>>> for Sequential<N> {
    fn from(children: Vec<BoxedProducer<N>>) -> Self {
        Self {
            children,
            current: 0,
        }
    }
}

impl<N> fmt::Debug for Sequential<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequential")
            .field("children", &self.children.len())
            .field("current", &self.current)
            .finish()
    }
}

impl<N: Send + 'static> ProtocolProducer<N> for Sequential<N> {
    fn is_exhausted(&self) -> bool {
        self.children[self.current.min(self.children.len())..]
            .iter()
            .all(|child| child.is_exhausted())
    }

    fn advance(&mut self, capacity: usize, batch: &mut Vec<N>) -> Result<usize, Error> {
        while let Some(child) = self.children.get_mut(self.current) {
            if child.is_exhausted() {
                self.current += 1;
                continue;
            }
            let emitted = child.advance(capacity, batch)?;
            if emitted > 0 || !child.is_exhausted() {
                return Ok(emitted);
            }
            self.current += 1;
        }
        Ok(0)
    }
}

/// Runs its children side by side, all of their ready operations share a round.
///
/// The child that is advanced first rotates between calls, so that no child is starved when the
/// capacity is smaller than the number of ready operations.
pub struct Parallel<N> {
    children: Vec<BoxedProducer<N>>,
    cursor: usize,
}

impl<N> Parallel<N> {
    /// An empty parallel node.
    pub fn new() -> Self {
        Self {
            children: vec![],
            cursor: 0,
        }
    }

    /// Adds a child that runs in parallel to all others.
    pub fn append(&mut self, child: impl ProtocolProducer<N> + 'static) {
        self.children.push(Box::new(child));
    }

    /// Adds a child and returns the node, for chaining.
    pub fn with(mut self, child: impl ProtocolProducer<N> + 'static) -> Self {
        self.append(child);
        self
    }
}

impl<N> Default for Parallel<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> From<Vec<BoxedProducer<N>>> for Parallel<N> {
    fn from(children: Vec<BoxedProducer<N>>) -> Self {
        Self {
            children,
            cursor: 0,
        }
    }
}

impl<N> fmt::Debug for Parallel<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parallel")
            .field("children", &self.children.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl<N: Send + 'static> ProtocolProducer<N> for Parallel<N> {
    fn is_exhausted(&self) -> bool {
        self.children.iter().all(|child| child.is_exhausted())
    }

    fn advance(&mut self, capacity: usize, batch: &mut Vec<N>) -> Result<usize, Error> {
        let n = self.children.len();
        let mut emitted = 0;
        for k in 0..n {
            if emitted == capacity {
                break;
            }
            let child = &mut self.children[(self.cursor + k) % n];
            if !child.is_exhausted() {
                emitted += child.advance(capacity - emitted, batch)?;
            }
        }
        // exhausted children have handed out all of their operations
        self.children.retain(|child| !child.is_exhausted());
        if !self.children.is_empty() {
            self.cursor = (self.cursor + 1) % self.children.len();
        }
        Ok(emitted)
    }
}

/// A protocol whose next round is only known once the previous round has been evaluated.
///
/// The protocol is a state machine over an explicit state type. Every time the subtree of the
/// previous round is exhausted (and evaluated), [`RoundProtocol::next_round`] builds the subtree
/// of the next round from the current state, usually after inspecting opened values.
pub trait RoundProtocol<N>: Send {
    /// The states of the protocol.
    type State: fmt::Debug + Send;

    /// The state before the first round.
    fn initial_state(&self) -> Self::State;

    /// Whether no further rounds follow.
    fn is_terminal(&self, state: &Self::State) -> bool;

    /// Builds the subtree for `state` and returns it together with the following state.
    ///
    /// `None` means that there is nothing to do in this state.
    fn next_round(
        &mut self,
        state: Self::State,
    ) -> Result<(Option<BoxedProducer<N>>, Self::State), Error>;
}

/// Drives a [`RoundProtocol`].
pub struct RoundBased<R: RoundProtocol<N>, N> {
    protocol: R,
    state: Option<R::State>,
    current: Option<BoxedProducer<N>>,
}

impl<R: RoundProtocol<N>, N> RoundBased<R, N> {
    /// Wraps a round protocol, starting in its initial state.
    pub fn new(protocol: R) -> Self {
        let state = protocol.initial_state();
        Self {
            protocol,
            state: Some(state),
            current: None,
        }
    }
}

impl<R: RoundProtocol<N>, N> fmt::Debug for RoundBased<R, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundBased")
            .field("state", &self.state)
            .field("running", &self.current.is_some())
            .finish()
    }
}

impl<R: RoundProtocol<N>, N: Send> ProtocolProducer<N> for RoundBased<R, N> {
    fn is_exhausted(&self) -> bool {
        let terminal = match &self.state {
            Some(state) => self.protocol.is_terminal(state),
            None => true,
        };
        terminal && self.current.as_ref().is_none_or(|c| c.is_exhausted())
    }

    fn advance(&mut self, capacity: usize, batch: &mut Vec<N>) -> Result<usize, Error> {
        loop {
            if let Some(current) = &mut self.current {
                if !current.is_exhausted() {
                    let emitted = current.advance(capacity, batch)?;
                    if emitted > 0 || !current.is_exhausted() {
                        return Ok(emitted);
                    }
                }
                self.current = None;
            }
            let Some(state) = self.state.take() else {
                return Ok(0);
            };
            if self.protocol.is_terminal(&state) {
                self.state = Some(state);
                return Ok(0);
            }
            let (subtree, next) = self.protocol.next_round(state)?;
            self.state = Some(next);
            self.current = subtree;
        }
    }
}

/// The builder of a [`SimpleProtocol`].
pub type Builder<N> = Box<dyn FnOnce() -> Result<BoxedProducer<N>, Error> + Send>;

/// A protocol whose whole tree is known up front but built lazily on first use.
pub struct SimpleProtocol<N> {
    builder: Option<Builder<N>>,
    inner: Option<BoxedProducer<N>>,
}

impl<N> SimpleProtocol<N> {
    /// Wraps a function that builds the tree.
    pub fn new(
        builder: impl FnOnce() -> Result<BoxedProducer<N>, Error> + Send + 'static,
    ) -> Self {
        Self {
            builder: Some(Box::new(builder)),
            inner: None,
        }
    }
}

impl<N> fmt::Debug for SimpleProtocol<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleProtocol")
            .field("built", &self.inner.is_some())
            .finish()
    }
}

impl<N: Send> ProtocolProducer<N> for SimpleProtocol<N> {
    fn is_exhausted(&self) -> bool {
        self.builder.is_none() && self.inner.as_ref().is_none_or(|inner| inner.is_exhausted())
    }

    fn advance(&mut self, capacity: usize, batch: &mut Vec<N>) -> Result<usize, Error> {
        if let Some(builder) = self.builder.take() {
            self.inner = Some(builder()?);
        }
        match &mut self.inner {
            Some(inner) => inner.advance(capacity, batch),
            None => Ok(0),
        }
    }
}

//! The stateful projection: current node, downstream outputs, listeners.
//!
//! Applies must be serialized by the caller (one logical thread drives a
//! projection graph). The node swap itself is atomic, so a reader calling
//! [`Projection::current`] never observes a torn node.

use crate::error::{ProjectionError, Result};
use crate::listeners::{ListenerId, ListenerRegistry};
use crate::source::RevisionSource;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};
use ulid::Ulid;
use warden_core::{ProjectionNode, RevisionClock, RevisionId};

/// Identity of one projection instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectionId(Ulid);

impl ProjectionId {
    fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for ProjectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a delivered input came from: the sending projection and the
/// sequence number of the revision that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Origin {
    pub source: ProjectionId,
    pub seq: u64,
}

/// Listener invoked with `(next, delta, previous)` after every applied input.
pub type NodeListener<N> = dyn Fn(&Arc<N>, &<N as ProjectionNode>::Delta, &Arc<N>) + Send + Sync;

enum Delivery {
    Delivered,
    Gone,
}

type Deliver<D> = dyn Fn(Origin, &D) -> Delivery + Send + Sync;

struct OutputEdge<D> {
    target: ProjectionId,
    deliver: Arc<Deliver<D>>,
}

struct ProjectionState<N> {
    node: Arc<N>,
    clock: RevisionClock,
    revision: RevisionId,
    /// Number of inputs applied so far; stamps outgoing deliveries.
    seq: u64,
    /// Last sequence number applied per upstream projection.
    seen: HashMap<ProjectionId, u64>,
    disposed: bool,
}

type Detach = Box<dyn FnOnce() + Send>;

/// A stateful wrapper around the current revision of a [`ProjectionNode`].
pub struct Projection<N: ProjectionNode> {
    id: ProjectionId,
    state: Mutex<ProjectionState<N>>,
    outputs: Mutex<Vec<OutputEdge<N::Delta>>>,
    listeners: ListenerRegistry<NodeListener<N>>,
    sources: Mutex<Vec<Detach>>,
}

impl<N: ProjectionNode> Projection<N> {
    /// Create a projection whose current node is `node`.
    pub fn new(node: N) -> Arc<Self> {
        let mut clock = RevisionClock::new();
        let revision = clock.tick();
        Arc::new(Self {
            id: ProjectionId::generate(),
            state: Mutex::new(ProjectionState {
                node: Arc::new(node),
                clock,
                revision,
                seq: 0,
                seen: HashMap::new(),
                disposed: false,
            }),
            outputs: Mutex::new(Vec::new()),
            listeners: ListenerRegistry::new(),
            sources: Mutex::new(Vec::new()),
        })
    }

    /// Seed a projection from upstream current states.
    pub fn from_initial_inputs(empty: N, inputs: &[N::Input]) -> Arc<Self> {
        let delta = empty.reduce_initial_inputs(inputs);
        Self::new(empty.reduce_delta(&delta))
    }

    pub fn id(&self) -> ProjectionId {
        self.id
    }

    /// The current node.
    pub fn current(&self) -> Arc<N> {
        Arc::clone(&self.state.lock().node)
    }

    /// Identifier of the revision the current node belongs to.
    pub fn current_revision(&self) -> RevisionId {
        self.state.lock().revision
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Apply one upstream input and propagate the resulting delta.
    ///
    /// Reducer panics are not caught: once a reducer fails the projection's
    /// invariants no longer hold.
    pub fn apply_input(&self, input: N::Input) -> Result<N::Delta> {
        self.apply(None, &input)
    }

    /// Apply an input delivered by a sequenced upstream.
    ///
    /// Fails with [`ProjectionError::StaleDelivery`], leaving the node
    /// untouched, when `origin.seq` is not newer than the last input applied
    /// from `origin.source`.
    pub fn apply_upstream_input(&self, origin: Origin, input: N::Input) -> Result<N::Delta> {
        self.apply(Some(origin), &input)
    }

    fn apply(&self, origin: Option<Origin>, input: &N::Input) -> Result<N::Delta> {
        let (delta, next, previous, seq) = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(ProjectionError::Disposed(self.id));
            }
            if let Some(origin) = origin {
                if let Some(&last) = state.seen.get(&origin.source) {
                    if origin.seq <= last {
                        warn!(
                            projection = %self.id,
                            source = %origin.source,
                            seq = origin.seq,
                            last,
                            "dropping stale upstream delivery"
                        );
                        return Err(ProjectionError::StaleDelivery {
                            upstream: origin.source,
                            seq: origin.seq,
                            last,
                        });
                    }
                }
            }

            let delta = state.node.reduce_input(input);
            let next = Arc::new(state.node.reduce_delta(&delta));
            let previous = std::mem::replace(&mut state.node, Arc::clone(&next));

            if let Some(origin) = origin {
                state.seen.insert(origin.source, origin.seq);
            }
            state.revision = state.clock.tick();
            state.seq += 1;
            trace!(projection = %self.id, revision = %state.revision, "applied input");
            (delta, next, previous, state.seq)
        };

        self.fan_out(Origin { source: self.id, seq }, &delta);

        for listener in self.listeners.snapshot() {
            listener(&next, &delta, &previous);
        }

        Ok(delta)
    }

    fn fan_out(&self, origin: Origin, delta: &N::Delta) {
        let edges: Vec<(ProjectionId, Arc<Deliver<N::Delta>>)> = self
            .outputs
            .lock()
            .iter()
            .map(|edge| (edge.target, Arc::clone(&edge.deliver)))
            .collect();

        let mut gone = Vec::new();
        for (target, deliver) in edges {
            if let Delivery::Gone = deliver(origin, delta) {
                gone.push(target);
            }
        }

        if !gone.is_empty() {
            debug!(projection = %self.id, pruned = gone.len(), "pruning dropped outputs");
            self.outputs
                .lock()
                .retain(|edge| !gone.contains(&edge.target));
        }
    }

    /// Forward every future delta to `output`.
    ///
    /// Returns `Ok(false)` when `output` is already attached to this projection.
    pub fn add_output<M>(&self, output: &Arc<Projection<M>>) -> Result<bool>
    where
        M: ProjectionNode,
        M::Input: From<N::Delta>,
    {
        self.add_output_with(output, |delta: &N::Delta| {
            <M::Input as From<N::Delta>>::from(delta.clone())
        })
    }

    /// Forward every future delta to `output`, converting it with `map`.
    ///
    /// Used for multi-input nodes, where each upstream maps into one variant
    /// of the downstream input. The output is held weakly.
    pub fn add_output_with<M, F>(&self, output: &Arc<Projection<M>>, map: F) -> Result<bool>
    where
        M: ProjectionNode,
        F: Fn(&N::Delta) -> M::Input + Send + Sync + 'static,
    {
        if output.id == self.id {
            return Err(ProjectionError::SelfOutput(self.id));
        }
        if self.state.lock().disposed {
            return Err(ProjectionError::Disposed(self.id));
        }

        let mut outputs = self.outputs.lock();
        if outputs.iter().any(|edge| edge.target == output.id) {
            return Ok(false);
        }

        let target: Weak<Projection<M>> = Arc::downgrade(output);
        let deliver = move |origin: Origin, delta: &N::Delta| -> Delivery {
            let Some(target) = target.upgrade() else {
                return Delivery::Gone;
            };
            match target.apply(Some(origin), &map(delta)) {
                Ok(_) | Err(ProjectionError::StaleDelivery { .. }) => Delivery::Delivered,
                Err(_) => Delivery::Gone,
            }
        };
        outputs.push(OutputEdge {
            target: output.id,
            deliver: Arc::new(deliver),
        });
        debug!(projection = %self.id, output = %output.id, "output attached");
        Ok(true)
    }

    /// Returns false when `output` was not attached.
    pub fn remove_output<M: ProjectionNode>(&self, output: &Arc<Projection<M>>) -> bool {
        let mut outputs = self.outputs.lock();
        let before = outputs.len();
        outputs.retain(|edge| edge.target != output.id);
        outputs.len() != before
    }

    pub fn output_count(&self) -> usize {
        self.outputs.lock().len()
    }

    /// Register a listener called with `(next, delta, previous)`.
    ///
    /// Listeners run synchronously in registration order and must not call
    /// back into this projection's mutating methods.
    pub fn add_node_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Arc<N>, &N::Delta, &Arc<N>) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    pub fn remove_node_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Subscribe to an upstream revision source, mapping each
    /// `(revision, delta)` pair into an input of this node.
    pub fn attach_source<R, D, S, F>(self: &Arc<Self>, source: &Arc<S>, map: F) -> Result<ListenerId>
    where
        R: 'static,
        D: 'static,
        S: RevisionSource<R, D> + ?Sized + 'static,
        F: Fn(&R, &D) -> N::Input + Send + Sync + 'static,
    {
        if self.is_disposed() {
            return Err(ProjectionError::Disposed(self.id));
        }

        let projection = Arc::downgrade(self);
        let id = source.on_revision(Arc::new(move |revision: &R, delta: &D| {
            let Some(projection) = projection.upgrade() else {
                return;
            };
            if let Err(error) = projection.apply_input(map(revision, delta)) {
                warn!(%error, "revision delivered to an unusable projection");
            }
        }));

        let source = Arc::clone(source);
        self.sources.lock().push(Box::new(move || {
            source.off_revision(id);
        }));
        Ok(id)
    }

    /// Detach from every upstream source, then clear outputs and listeners.
    ///
    /// Calling `apply_input` afterwards returns [`ProjectionError::Disposed`].
    pub fn dispose(&self) {
        let sources = std::mem::take(&mut *self.sources.lock());
        for detach in sources {
            detach();
        }
        self.outputs.lock().clear();
        self.listeners.clear();
        self.state.lock().disposed = true;
        debug!(projection = %self.id, "projection disposed");
    }
}

impl<N: ProjectionNode> Drop for Projection<N> {
    fn drop(&mut self) {
        for detach in self.sources.get_mut().drain(..) {
            detach();
        }
    }
}

impl<N: ProjectionNode + fmt::Debug> fmt::Debug for Projection<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Projection")
            .field("id", &self.id)
            .field("revision", &state.revision)
            .field("node", &state.node)
            .field("disposed", &state.disposed)
            .finish()
    }
}

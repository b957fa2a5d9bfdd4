//! Projection node contract - the pure half of the dataflow engine
//!
//! A node is one immutable revision of derived state. Three reducers move
//! the dataflow forward:
//!  - `reduce_initial_inputs`: seed a delta from upstream current states
//!  - `reduce_input`: turn one upstream delta into a delta of this node
//!  - `reduce_delta`: produce the next node from a delta
//!
//! For any node `n` and input sequence `i1..ik`, folding
//! `n = n.reduce_delta(&n.reduce_input(i))` must equal
//! `n.reduce_delta(&n.reduce_initial_inputs(&[i1..ik]))`.

/// The reducer contract every projected state implements.
///
/// Implementations must be pure: the result of each reducer depends only on
/// `self` and its argument. Two independently constructed nodes fed the same
/// delta sequence must compare equal.
pub trait ProjectionNode: Clone + PartialEq + Send + Sync + 'static {
    /// Upstream change consumed by this node (a tuple or enum for multi-input nodes).
    type Input: Clone + Send + Sync + 'static;

    /// Change produced by this node and forwarded downstream.
    type Delta: Clone + Send + Sync + 'static;

    /// Seed a delta from one or more upstream current states, each expressed
    /// as an input relative to empty upstream state.
    fn reduce_initial_inputs(&self, inputs: &[Self::Input]) -> Self::Delta;

    /// Compute the delta caused by one upstream input.
    fn reduce_input(&self, input: &Self::Input) -> Self::Delta;

    /// Produce the next node. Never mutates `self`.
    #[must_use]
    fn reduce_delta(&self, delta: &Self::Delta) -> Self;
}

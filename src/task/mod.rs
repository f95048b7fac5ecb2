//! Task Engines
//!
//! Two engines carry all replication work: the delay engine coalesces rapid
//! repeated changes to the same key, and the execute engine runs the
//! resulting work on a fixed worker set with strict per-key ordering.

mod delay;
mod execute;

pub use delay::{DelayTaskEngine, DelayTaskProcessor};
pub use execute::{ExecuteTask, ExecuteTaskEngine};

/// A unit of deferrable, coalescible work.
///
/// Concrete task kinds implement merge semantics for their own payload; the
/// general contract is that merging never loses an in-flight change.
pub trait DelayTask: Clone + Send + 'static {
    /// Absorb a newer task submitted for the same key
    fn merge(&mut self, newer: Self);

    /// Whether enough time has passed for this task to be dispatched
    fn should_process(&self) -> bool;
}

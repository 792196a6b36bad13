//! Health and capacity classifiers (§4.5): pure functions from a
//! reconciliation snapshot to `Action`s, with no I/O. `applications/clustermgtd`
//! is the only place these are consumed, and the only place any of their
//! output is actually dispatched.

pub mod action;
pub mod classifiers;

pub use action::Action;
pub use classifiers::{
    bootstrap_failed, capacity_block_actions, classify_capacity_block, evaluate_bound_pair, orphan,
    unhealthy, CapacityBlockAction, CAPACITY_BLOCK_EXPIRED_REASON, CAPACITY_BLOCK_PENDING_REASON,
};

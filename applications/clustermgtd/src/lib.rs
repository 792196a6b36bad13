//! Head-node reconciliation daemon (§4.6): binds scheduler nodes to cloud
//! instances, applies the health and capacity-block classifiers from
//! `health-policy`, and dispatches the resulting actions through `CloudApi`
//! and the scheduler adapter.

pub mod dispatch;
pub mod error;
pub mod fleet_gate;
pub mod protected;
pub mod reconcile;
pub mod snapshot;

pub use error::{ClustermgtdError, Result};
pub use reconcile::{IterationReport, Reconciler};

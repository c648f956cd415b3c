//! Service layer
//!
//! Contains the reconciliation logic separated from the remote client.
//! Services orchestrate the fetcher, ledger store and graph snapshot.

mod candidates;
mod mutation;
mod policy;
mod reconcile;

pub use candidates::CandidateSelector;
pub use mutation::{MutationApplier, TESTING_MAX_MUTATIONS};
pub use policy::ReconciliationPolicy;
pub use reconcile::{Operator, Reconciler, RunReport};

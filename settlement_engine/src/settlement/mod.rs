//! Settlement rules that do not touch storage or the gateway: cart partitioning, the order state machine, payment
//! splits and webhook reconciliation planning.
pub mod order_state;
pub mod partitioner;
pub mod reconciler;
pub mod splits;

pub use order_state::{check_transition, plan_cancellation, plan_fulfilment, rollup_parent_status, TransitionActor};
pub use partitioner::{partition, partition_items, resolve_cart, DraftItem, ResolvedItem, SubOrderDraft};
pub use reconciler::{plan_event, ReconcileDecision, ReconcileOutcome, ReconcileStatus};
pub use splits::{compute_splits, total_commission, verify_splits};

//! Scheduling and reconciliation layer: workers drain the priority queue
//! through the marketplace strategies, the reconciler applies the results,
//! and the circuit breaker pauses everything when blocking turns systemic.

pub mod circuit;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod producer;
pub mod reconciler;
pub mod repository;
pub mod trend;
pub mod worker;

#[cfg(feature = "testkit")]
pub mod testkit;

pub use circuit::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use error::{EngineError, NotifyError};
pub use monitor::{MarketplaceStatus, Monitor, MonitorReport};
pub use notify::{dispatch, LogNotifier, Notifier, PriceAlert, PushPlusNotifier};
pub use producer::{BacklogLimits, TaskProducer, TopUp};
pub use reconciler::{AppliedPrice, ReconcileReport, ResultReconciler};
pub use repository::{ItemRepository, PgItemRepository};
pub use trend::{AlertPolicy, PriceChange, TrendTag};
pub use worker::{BatchSummary, WorkerPool, WorkerSettings, WorkerStep};

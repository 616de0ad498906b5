pub mod decision;
pub mod identity;
pub mod manager;
pub mod orchestrator;
pub mod pair;
pub mod reconcile;
pub mod report;
pub mod scanner;
pub mod task;
pub mod watermark;

pub use decision::{decide, PlaybackState, ReconciliationAction, Side};
pub use manager::{TaskManager, TaskSummary};
pub use orchestrator::Orchestrator;
pub use pair::{PairStrategy, Pairing};
pub use reconcile::Reconciler;
pub use report::{CycleReport, UnitReport};
pub use scanner::{Candidate, Feeds};
pub use task::{SyncTask, TaskError, TaskStatus};
pub use watermark::{Channel, HighWaterMark, Peer};

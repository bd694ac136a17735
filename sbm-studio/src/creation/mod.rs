//! Song creation: session partitioning, the batch engine, queue execution
//! and pending reconciliation

pub mod batch_creator;
pub mod partition;
pub mod queue_runner;
pub mod reconciler;

pub use batch_creator::{BatchRequest, BatchSongCreator, BatchSummary, CreationTiming, SongResult};
pub use queue_runner::{QueueRunOutcome, QueueRunRequest, QueueRunner};
pub use reconciler::{
    ApiClipFeed, ClipFeed, PendingReconciler, PendingResolver, PendingSong, ReconcileReport,
    TitleMatchResolver,
};

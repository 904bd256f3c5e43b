//! Transcript synchronisation for a one-to-one chat: history merge, live messages,
//! local sends and the periodic topic poller, driven by a single controller.

mod controller;
mod error;
mod events;
mod history;
mod ingest;
mod message;
mod poller;
mod scheduler;
mod transcript;

pub use controller::{Collaborators, Command, Completion, ControllerHandle, TranscriptController};
pub use error::{SyncError, SyncResult};
pub use events::ViewEvent;
pub use history::load_history;
pub use message::{Message, MessageId, Origin, Peer, Session};
pub use poller::{
    ClassifiedCycle, DEFAULT_POLL_INTERVAL, DEFAULT_SAMPLE_SIZE, PollCycleId, PollPhase,
    PollState, PollerConfig, TickOutcome, Topic, TopicPoller, distinct_topics,
};
pub use scheduler::{ArmedTimer, Scheduler, TimerHandle, TimerId, TokioScheduler};
pub use transcript::{HistoryApply, HistoryGeneration, Transcript};

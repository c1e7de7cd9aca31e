//! Challenge engine — lifecycle state machine, answer collection,
//! reminders, and the daily summary.

pub mod lifecycle;
pub mod reminder;
pub mod session;
pub mod summary;

pub use lifecycle::LifecycleEngine;
pub use reminder::ReminderScheduler;
pub use session::{ChallengeSession, SessionMap, SubmitOutcome};
pub use summary::SummaryBuilder;

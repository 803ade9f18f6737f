//! Periodic ingestion: polling subscribed feeds into a [`FeedStore`].
//!
//! [`Poller`] does the work of one tick or one manual refresh,
//! [`Scheduler`] runs it on a timer, and [`import_opml`] / [`export_opml`]
//! manage subscriptions in bulk.
//!
//! [`FeedStore`]: crate::storage::FeedStore

mod clock;
mod poller;
mod scheduler;
mod subscriptions;

pub use clock::{Clock, FixedClock, SystemClock};
pub use poller::{FeedRefresh, FeedReport, PollError, PollOutcome, Poller, TickReport};
pub use scheduler::{
    IntervalTicker, ManualTicker, ManualTrigger, Scheduler, SchedulerHandle, Ticker,
};
pub use subscriptions::{export_opml, import_opml, ImportError, ImportReport};

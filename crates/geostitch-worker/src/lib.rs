//! # geostitch-worker
//!
//! Scheduled background work for GeoStitch:
//! - the periodic sweep that re-examines pending upload sessions
//! - the janitor that aborts stale multipart uploads
//!
//! Jobs are dispatched through a [`executor::JobExecutor`] and fired by the
//! cron [`scheduler::CronScheduler`].

pub mod executor;
pub mod jobs;
pub mod scheduler;

pub use scheduler::CronScheduler;

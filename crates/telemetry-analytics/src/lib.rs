//! Presence and chat analytics for live collaboration sessions.
//!
//! The tracker keeps per-session state as membership changes and derives
//! engagement counts and short-attendance flags; the aggregate store folds
//! each finished session into the durable server history.

pub mod aggregate;
pub mod reports;
pub mod tracker;

pub use aggregate::ServerAggregateStore;
pub use reports::ReportGenerator;
pub use tracker::SessionAnalyticsTracker;

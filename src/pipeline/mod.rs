//! Pipeline entry points for the sync cycle.
//!
//! - `CrawlSupervisor`: bounded link discovery for one site
//! - `ResultAggregator`: one crawl per watched site, failures isolated
//! - `NotificationDispatcher`: one delivery per pending notification
//! - `Orchestrator`: crawl, record new posts, notify

pub mod aggregate;
pub mod crawl;
pub mod dispatch;
pub mod sync;

pub use aggregate::{AggregateReport, ResultAggregator};
pub use crawl::CrawlSupervisor;
pub use dispatch::{DispatchReport, NotificationDispatcher};
pub use sync::{Orchestrator, SyncReport};

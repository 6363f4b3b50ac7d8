//! Multi-protocol health monitoring engine.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use status_monitor::{Config, Monitor};
//!
//! let config = Config::from_config(None::<&std::path::Path>)?;
//! let monitor = Monitor::new(config.services()?, None).await?;
//! monitor.start();
//! println!("overall: {}", monitor.get_overall_status().await);
//! monitor.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod monitor;
pub mod persistence;
pub mod probe;
pub mod service;
pub mod store;
pub mod types;

pub use broadcast::{Broadcaster, SUBSCRIBER_CAPACITY, Subscription};
pub use config::{Config, ServiceConfig, StorageConfig};
pub use error::{ConfigError, ProbeError, StorageError};
pub use monitor::Monitor;
pub use persistence::{
    CheckPoint, HistoryStore, LibsqlHistoryStore, MemoryHistoryStore, PersistenceGateway,
    ServiceCheckHistory,
};
pub use probe::Prober;
pub use service::{Check, CheckKind, Service};
pub use store::{StatusStore, aggregate};
pub use types::{HistoryPoint, MAX_HISTORY, ProbeOutcome, ServiceStatus, Status};

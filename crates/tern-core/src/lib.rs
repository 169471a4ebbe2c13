pub mod error;
pub use error::{
    ExecutorError, LogError, NotifyError, ReportedError, ServiceError, StoreError,
};

pub mod numbergroup;
pub use numbergroup::{MemoryNumberGroup, NumberGroup};

pub mod logs;
pub use logs::{FileLogStore, LogReader, LogStore, LogWriter, MemoryLogStore};

pub mod cutter;
pub use cutter::{Cutter, CutterMode, DefaultCutter, NoCutter, Sliced, slice};

pub mod events;
pub use events::{EventBus, Subscription};

pub mod store;
pub use store::{JobStore, MemoryJobStore};

pub mod executor;
pub use executor::{JobExecutor, OnTransition, StartOptions};

pub mod notify;
pub use notify::Notifier;

pub mod service;
pub use service::{ErrorHandler, JobService, ListenEvent, ListenOptions, LogsMode, ServiceConfig};

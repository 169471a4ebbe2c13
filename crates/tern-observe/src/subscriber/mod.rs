mod journal;
mod tasks;
pub mod view;

pub use journal::Journal;
pub use tasks::{TaskJournal, log_task_event};
pub use view::{View, log_status, message_for};

use chrono::{DateTime, Utc};

use crate::scheduler::{Scheduler, Task};
use crate::storage::Storage;
use crate::ui::NotificationQueue;

/// Mutable state an operation may touch, borrowed from the [`crate::app::App`]
/// for the duration of one call.
pub struct Ctx<'a, S> {
    pub storage: &'a mut Storage<S>,
    pub notices: &'a mut NotificationQueue,
    pub scheduler: &'a mut Scheduler<Task>,
    pub now: DateTime<Utc>,
}

//! Outbound schedule notifications.

use chrono::NaiveDateTime;
use log::{debug, info};
use tokio::sync::broadcast;

use tunersched_protocol::{RuleId, ScheduleId};

/// Change published after a pass persisted something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleEvent {
    /// The persisted conflict set was replaced with a different one.
    ConflictsChanged { count: usize },
    /// One occurrence (or a whole Once schedule) will not be recorded.
    ScheduleCanceled {
        schedule_id: ScheduleId,
        start: NaiveDateTime,
    },
    /// A schedule was recreated at its program's actual time.
    ScheduleMoved {
        schedule_id: ScheduleId,
        new_schedule_id: ScheduleId,
        nominal_start: NaiveDateTime,
        actual_start: NaiveDateTime,
    },
    /// A rule match was persisted as a schedule.
    RuleScheduleCreated {
        rule_id: RuleId,
        schedule_id: ScheduleId,
    },
}

/// Fire-and-forget event fan-out.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<ScheduleEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ScheduleEvent) {
        info!("Event: {:?}", event);
        if let Err(e) = self.sender.send(event) {
            debug!("Event dropped, no subscribers: {:?}", e.0);
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

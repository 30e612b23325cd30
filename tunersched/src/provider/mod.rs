//! Collaborator contracts consumed by the scheduling engine.
//!
//! The engine never talks to a store directly. Each concern is a narrow
//! trait; a backend implements all of them and is bundled into a
//! [`Backend`]:
//! - [`CardSource`]: tuner cards and their tuning details
//! - [`ChannelSource`]: channels and channel groups
//! - [`ProgramSource`]: program guide listings
//! - [`ScheduleStore`]: persisted schedules and canceled occurrences
//! - [`RuleStore`]: schedule rules
//! - [`ConflictStore`]: the conflict set produced by the last full pass
//! - [`RecordingLookup`]: existing recordings and known series
//!
//! Absence is reported as `Option`/`bool`; errors mean the collaborator
//! failed.

#[cfg(test)]
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use tunersched_protocol::{
    CanceledSchedule, Card, CardId, Channel, ChannelGroup, ChannelId, Conflict, KnownSeries,
    Program, ProgramId, ProviderResult, Recording, RecordingStatus, RuleId, Schedule, ScheduleId,
    ScheduleRule, TuningDetail,
};

pub use sqlite::SqliteBackend;

#[async_trait]
pub trait CardSource: Send + Sync {
    async fn cards(&self) -> ProviderResult<Vec<Card>>;

    /// Tuning parameters for receiving `channel_id` on `card_id`, if the card can.
    async fn tuning_detail(
        &self,
        card_id: CardId,
        channel_id: ChannelId,
    ) -> ProviderResult<Option<TuningDetail>>;
}

#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn channels(&self) -> ProviderResult<Vec<Channel>>;

    async fn channel_groups(&self) -> ProviderResult<Vec<ChannelGroup>>;
}

#[async_trait]
pub trait ProgramSource: Send + Sync {
    /// Programs of one channel overlapping `[from, to)`.
    async fn programs_for_channel(
        &self,
        channel_id: ChannelId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> ProviderResult<Vec<Program>>;

    /// Programs on any channel with an equal (case-insensitive) title overlapping `[from, to)`.
    async fn programs_by_title(
        &self,
        title: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> ProviderResult<Vec<Program>>;

    async fn update_recording_statuses(
        &self,
        statuses: &[(ProgramId, RecordingStatus)],
    ) -> ProviderResult<()>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn schedules(&self) -> ProviderResult<Vec<Schedule>>;

    async fn schedule(&self, id: ScheduleId) -> ProviderResult<Option<Schedule>>;

    /// Persist a new schedule; the store assigns the id.
    async fn create_schedule(&self, schedule: &Schedule) -> ProviderResult<ScheduleId>;

    async fn update_schedule(&self, schedule: &Schedule) -> ProviderResult<bool>;

    async fn remove_schedule(&self, id: ScheduleId) -> ProviderResult<bool>;

    async fn canceled_schedules(&self) -> ProviderResult<Vec<CanceledSchedule>>;

    async fn cancel_occurrence(&self, canceled: CanceledSchedule) -> ProviderResult<()>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn rules(&self) -> ProviderResult<Vec<ScheduleRule>>;

    /// Persist a new rule; ids are assigned by the store and increase monotonically.
    async fn create_rule(&self, rule: &ScheduleRule) -> ProviderResult<RuleId>;

    async fn update_rule(&self, rule: &ScheduleRule) -> ProviderResult<bool>;

    async fn remove_rule(&self, id: RuleId) -> ProviderResult<bool>;
}

#[async_trait]
pub trait ConflictStore: Send + Sync {
    /// Replace the whole conflict set atomically.
    async fn replace_conflicts(&self, conflicts: &[Conflict]) -> ProviderResult<()>;

    async fn conflicts(&self) -> ProviderResult<Vec<Conflict>>;
}

#[async_trait]
pub trait RecordingLookup: Send + Sync {
    async fn recordings_by_name(&self, name: &str) -> ProviderResult<Vec<Recording>>;

    async fn known_series(&self) -> ProviderResult<Vec<KnownSeries>>;
}

/// Every collaborator the evaluator needs, behind trait objects.
#[derive(Clone)]
pub struct Backend {
    pub cards: Arc<dyn CardSource>,
    pub channels: Arc<dyn ChannelSource>,
    pub programs: Arc<dyn ProgramSource>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub rules: Arc<dyn RuleStore>,
    pub conflicts: Arc<dyn ConflictStore>,
    pub recordings: Arc<dyn RecordingLookup>,
}

impl Backend {
    /// Use one implementation for every contract.
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: CardSource
            + ChannelSource
            + ProgramSource
            + ScheduleStore
            + RuleStore
            + ConflictStore
            + RecordingLookup
            + 'static,
    {
        Self {
            cards: backend.clone(),
            channels: backend.clone(),
            programs: backend.clone(),
            schedules: backend.clone(),
            rules: backend.clone(),
            conflicts: backend.clone(),
            recordings: backend,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

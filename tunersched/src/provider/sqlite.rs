//! SQLite implementation of every collaborator contract.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use tunersched_protocol::{
    titles_equal, CanceledSchedule, Card, CardId, Channel, ChannelGroup, ChannelId, Conflict,
    KnownSeries, Program, ProgramId, ProviderResult, Recording, RecordingStatus, RuleId,
    Schedule, ScheduleId, ScheduleRule, TuningDetail,
};

use super::{
    CardSource, ChannelSource, ConflictStore, ProgramSource, RecordingLookup, RuleStore,
    ScheduleStore,
};
use crate::database::DatabaseHandle;

/// Adapter exposing the scheduling database to the engine.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    database: DatabaseHandle,
}

impl SqliteBackend {
    pub fn new(database: DatabaseHandle) -> Self {
        Self { database }
    }
}

#[async_trait]
impl CardSource for SqliteBackend {
    async fn cards(&self) -> ProviderResult<Vec<Card>> {
        let db = self.database.lock().await;
        Ok(db.get_all_cards()?)
    }

    async fn tuning_detail(
        &self,
        card_id: CardId,
        channel_id: ChannelId,
    ) -> ProviderResult<Option<TuningDetail>> {
        let db = self.database.lock().await;
        Ok(db.get_tuning_detail(card_id, channel_id)?)
    }
}

#[async_trait]
impl ChannelSource for SqliteBackend {
    async fn channels(&self) -> ProviderResult<Vec<Channel>> {
        let db = self.database.lock().await;
        Ok(db.get_all_channels()?)
    }

    async fn channel_groups(&self) -> ProviderResult<Vec<ChannelGroup>> {
        let db = self.database.lock().await;
        Ok(db.get_all_channel_groups()?)
    }
}

#[async_trait]
impl ProgramSource for SqliteBackend {
    async fn programs_for_channel(
        &self,
        channel_id: ChannelId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> ProviderResult<Vec<Program>> {
        let db = self.database.lock().await;
        Ok(db.get_programs_for_channel(channel_id, from, to)?)
    }

    async fn programs_by_title(
        &self,
        title: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> ProviderResult<Vec<Program>> {
        let db = self.database.lock().await;
        let programs = db.get_programs_by_title(title, from, to)?;
        // NOCASE only folds ASCII
        Ok(programs
            .into_iter()
            .filter(|p| titles_equal(&p.title, title))
            .collect())
    }

    async fn update_recording_statuses(
        &self,
        statuses: &[(ProgramId, RecordingStatus)],
    ) -> ProviderResult<()> {
        let mut db = self.database.lock().await;
        Ok(db.replace_recording_statuses(statuses)?)
    }
}

#[async_trait]
impl ScheduleStore for SqliteBackend {
    async fn schedules(&self) -> ProviderResult<Vec<Schedule>> {
        let db = self.database.lock().await;
        Ok(db.get_all_schedules()?)
    }

    async fn schedule(&self, id: ScheduleId) -> ProviderResult<Option<Schedule>> {
        let db = self.database.lock().await;
        Ok(db.get_schedule(id)?)
    }

    async fn create_schedule(&self, schedule: &Schedule) -> ProviderResult<ScheduleId> {
        let db = self.database.lock().await;
        Ok(db.insert_schedule(schedule)?)
    }

    async fn update_schedule(&self, schedule: &Schedule) -> ProviderResult<bool> {
        let db = self.database.lock().await;
        Ok(db.update_schedule(schedule)?)
    }

    async fn remove_schedule(&self, id: ScheduleId) -> ProviderResult<bool> {
        let db = self.database.lock().await;
        Ok(db.delete_schedule(id)?)
    }

    async fn canceled_schedules(&self) -> ProviderResult<Vec<CanceledSchedule>> {
        let db = self.database.lock().await;
        Ok(db.get_canceled_schedules()?)
    }

    async fn cancel_occurrence(&self, canceled: CanceledSchedule) -> ProviderResult<()> {
        let db = self.database.lock().await;
        Ok(db.insert_canceled_schedule(&canceled)?)
    }
}

#[async_trait]
impl RuleStore for SqliteBackend {
    async fn rules(&self) -> ProviderResult<Vec<ScheduleRule>> {
        let db = self.database.lock().await;
        Ok(db.get_all_rules()?)
    }

    async fn create_rule(&self, rule: &ScheduleRule) -> ProviderResult<RuleId> {
        let db = self.database.lock().await;
        Ok(db.insert_rule(rule)?)
    }

    async fn update_rule(&self, rule: &ScheduleRule) -> ProviderResult<bool> {
        let db = self.database.lock().await;
        Ok(db.update_rule(rule)?)
    }

    async fn remove_rule(&self, id: RuleId) -> ProviderResult<bool> {
        let db = self.database.lock().await;
        Ok(db.delete_rule(id)?)
    }
}

#[async_trait]
impl ConflictStore for SqliteBackend {
    async fn replace_conflicts(&self, conflicts: &[Conflict]) -> ProviderResult<()> {
        let mut db = self.database.lock().await;
        Ok(db.replace_conflicts(conflicts)?)
    }

    async fn conflicts(&self) -> ProviderResult<Vec<Conflict>> {
        let db = self.database.lock().await;
        Ok(db.get_all_conflicts()?)
    }
}

#[async_trait]
impl RecordingLookup for SqliteBackend {
    async fn recordings_by_name(&self, name: &str) -> ProviderResult<Vec<Recording>> {
        let db = self.database.lock().await;
        Ok(db.get_recordings_by_name(name)?)
    }

    async fn known_series(&self) -> ProviderResult<Vec<KnownSeries>> {
        let db = self.database.lock().await;
        Ok(db.get_known_series()?)
    }
}

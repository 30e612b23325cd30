//! In-memory backend for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use tunersched_protocol::{
    titles_equal, CanceledSchedule, Card, CardId, Channel, ChannelGroup, ChannelId, Conflict,
    KnownSeries, Program, ProgramId, ProviderError, ProviderResult, Recording, RecordingStatus,
    RuleId, Schedule, ScheduleId, ScheduleRule, Transmitter, TuningDetail,
};

use super::{
    Backend, CardSource, ChannelSource, ConflictStore, ProgramSource, RecordingLookup, RuleStore,
    ScheduleStore,
};

/// 2024-01-`day` at `h:m`.
pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// DVB-T tuning detail on the given frequency.
pub fn dvbt(channel_id: ChannelId, frequency: i64, encrypted: bool) -> TuningDetail {
    TuningDetail {
        id: channel_id * 100 + frequency,
        channel_id,
        name: format!("ch{}", channel_id),
        is_encrypted: encrypted,
        transmitter: Transmitter::DvbT {
            frequency,
            bandwidth: 8,
        },
    }
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub cards: Vec<Card>,
    pub tuning: Vec<(CardId, TuningDetail)>,
    pub channels: Vec<Channel>,
    pub groups: Vec<ChannelGroup>,
    pub programs: Vec<Program>,
    pub schedules: Vec<Schedule>,
    pub canceled: Vec<CanceledSchedule>,
    pub rules: Vec<ScheduleRule>,
    pub conflicts: Vec<Conflict>,
    pub recordings: Vec<Recording>,
    pub known_series: Vec<KnownSeries>,
    pub statuses: HashMap<ProgramId, RecordingStatus>,
    pub next_schedule_id: ScheduleId,
    pub next_rule_id: RuleId,

    pub fail_cards: bool,
    pub fail_rules: bool,
    pub fail_programs_for: HashSet<ChannelId>,
    pub fail_conflict_writes: bool,

    pub program_calls: usize,
    pub tuning_calls: usize,
    pub conflict_writes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn backend(self: &Arc<Self>) -> Backend {
        Backend::from_shared(Arc::clone(self))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_card(&self, card: Card) {
        self.with(|s| s.cards.push(card));
    }

    pub fn add_tuning(&self, card_id: CardId, detail: TuningDetail) {
        self.with(|s| s.tuning.push((card_id, detail)));
    }

    pub fn add_channel(&self, channel: Channel) {
        self.with(|s| s.channels.push(channel));
    }

    pub fn add_program(&self, program: Program) {
        self.with(|s| s.programs.push(program));
    }

    pub fn add_schedule(&self, mut schedule: Schedule) -> ScheduleId {
        self.with(|s| {
            s.next_schedule_id += 1;
            schedule.id = s.next_schedule_id;
            s.schedules.push(schedule);
            s.next_schedule_id
        })
    }

    pub fn add_rule(&self, mut rule: ScheduleRule) -> RuleId {
        self.with(|s| {
            s.next_rule_id += 1;
            rule.id = s.next_rule_id;
            s.rules.push(rule);
            s.next_rule_id
        })
    }

    pub fn schedules(&self) -> Vec<Schedule> {
        self.with(|s| s.schedules.clone())
    }

    pub fn conflicts(&self) -> Vec<Conflict> {
        self.with(|s| s.conflicts.clone())
    }

    pub fn rules(&self) -> Vec<ScheduleRule> {
        self.with(|s| s.rules.clone())
    }
}

#[async_trait]
impl CardSource for MemoryBackend {
    async fn cards(&self) -> ProviderResult<Vec<Card>> {
        self.with(|s| {
            if s.fail_cards {
                return Err(ProviderError::Unavailable("cards".into()));
            }
            Ok(s.cards.clone())
        })
    }

    async fn tuning_detail(
        &self,
        card_id: CardId,
        channel_id: ChannelId,
    ) -> ProviderResult<Option<TuningDetail>> {
        self.with(|s| {
            s.tuning_calls += 1;
            Ok(s.tuning
                .iter()
                .find(|(card, d)| *card == card_id && d.channel_id == channel_id)
                .map(|(_, d)| d.clone()))
        })
    }
}

#[async_trait]
impl ChannelSource for MemoryBackend {
    async fn channels(&self) -> ProviderResult<Vec<Channel>> {
        Ok(self.with(|s| s.channels.clone()))
    }

    async fn channel_groups(&self) -> ProviderResult<Vec<ChannelGroup>> {
        Ok(self.with(|s| s.groups.clone()))
    }
}

#[async_trait]
impl ProgramSource for MemoryBackend {
    async fn programs_for_channel(
        &self,
        channel_id: ChannelId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> ProviderResult<Vec<Program>> {
        self.with(|s| {
            s.program_calls += 1;
            if s.fail_programs_for.contains(&channel_id) {
                return Err(ProviderError::Unavailable(format!("programs of {}", channel_id)));
            }
            let mut programs: Vec<Program> = s
                .programs
                .iter()
                .filter(|p| p.channel_id == channel_id && p.overlaps(from, to))
                .cloned()
                .collect();
            programs.sort_by_key(|p| p.start);
            Ok(programs)
        })
    }

    async fn programs_by_title(
        &self,
        title: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> ProviderResult<Vec<Program>> {
        self.with(|s| {
            s.program_calls += 1;
            let mut programs: Vec<Program> = s
                .programs
                .iter()
                .filter(|p| {
                    titles_equal(&p.title, title)
                        && p.overlaps(from, to)
                        && !s.fail_programs_for.contains(&p.channel_id)
                })
                .cloned()
                .collect();
            programs.sort_by_key(|p| (p.start, p.channel_id));
            Ok(programs)
        })
    }

    async fn update_recording_statuses(
        &self,
        statuses: &[(ProgramId, RecordingStatus)],
    ) -> ProviderResult<()> {
        self.with(|s| {
            s.statuses = statuses.iter().copied().collect();
            Ok(())
        })
    }
}

#[async_trait]
impl ScheduleStore for MemoryBackend {
    async fn schedules(&self) -> ProviderResult<Vec<Schedule>> {
        Ok(self.schedules())
    }

    async fn schedule(&self, id: ScheduleId) -> ProviderResult<Option<Schedule>> {
        Ok(self.with(|s| s.schedules.iter().find(|x| x.id == id).cloned()))
    }

    async fn create_schedule(&self, schedule: &Schedule) -> ProviderResult<ScheduleId> {
        Ok(self.add_schedule(schedule.clone()))
    }

    async fn update_schedule(&self, schedule: &Schedule) -> ProviderResult<bool> {
        Ok(self.with(|s| match s.schedules.iter_mut().find(|x| x.id == schedule.id) {
            Some(existing) => {
                *existing = schedule.clone();
                true
            }
            None => false,
        }))
    }

    async fn remove_schedule(&self, id: ScheduleId) -> ProviderResult<bool> {
        Ok(self.with(|s| {
            let before = s.schedules.len();
            s.schedules.retain(|x| x.id != id);
            s.canceled.retain(|c| c.schedule_id != id);
            s.schedules.len() != before
        }))
    }

    async fn canceled_schedules(&self) -> ProviderResult<Vec<CanceledSchedule>> {
        Ok(self.with(|s| s.canceled.clone()))
    }

    async fn cancel_occurrence(&self, canceled: CanceledSchedule) -> ProviderResult<()> {
        self.with(|s| {
            if !s.canceled.contains(&canceled) {
                s.canceled.push(canceled);
            }
        });
        Ok(())
    }
}

#[async_trait]
impl RuleStore for MemoryBackend {
    async fn rules(&self) -> ProviderResult<Vec<ScheduleRule>> {
        self.with(|s| {
            if s.fail_rules {
                return Err(ProviderError::Unavailable("rule store offline".into()));
            }
            Ok(s.rules.clone())
        })
    }

    async fn create_rule(&self, rule: &ScheduleRule) -> ProviderResult<RuleId> {
        Ok(self.add_rule(rule.clone()))
    }

    async fn update_rule(&self, rule: &ScheduleRule) -> ProviderResult<bool> {
        Ok(self.with(|s| match s.rules.iter_mut().find(|x| x.id == rule.id) {
            Some(existing) => {
                *existing = rule.clone();
                true
            }
            None => false,
        }))
    }

    async fn remove_rule(&self, id: RuleId) -> ProviderResult<bool> {
        Ok(self.with(|s| {
            let before = s.rules.len();
            s.rules.retain(|x| x.id != id);
            s.rules.len() != before
        }))
    }
}

#[async_trait]
impl ConflictStore for MemoryBackend {
    async fn replace_conflicts(&self, conflicts: &[Conflict]) -> ProviderResult<()> {
        self.with(|s| {
            if s.fail_conflict_writes {
                return Err(ProviderError::Backend("conflict write rejected".into()));
            }
            s.conflict_writes += 1;
            s.conflicts = conflicts.to_vec();
            Ok(())
        })
    }

    async fn conflicts(&self) -> ProviderResult<Vec<Conflict>> {
        Ok(self.conflicts())
    }
}

#[async_trait]
impl RecordingLookup for MemoryBackend {
    async fn recordings_by_name(&self, name: &str) -> ProviderResult<Vec<Recording>> {
        Ok(self.with(|s| {
            s.recordings
                .iter()
                .filter(|r| titles_equal(&r.title, name))
                .cloned()
                .collect()
        }))
    }

    async fn known_series(&self) -> ProviderResult<Vec<KnownSeries>> {
        Ok(self.with(|s| s.known_series.clone()))
    }
}

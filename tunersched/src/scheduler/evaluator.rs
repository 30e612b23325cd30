//! Periodic evaluator.
//!
//! Drives the scheduling engine on a fixed interval, persists what a pass
//! decided and publishes the changes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime};
use log::{debug, error, info, warn};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;

use tunersched_protocol::{
    weekday_of, CanceledSchedule, CardId, ChannelId, Conflict, EpisodeManagementScheme, Program,
    ProgramId, ProviderError, ProviderResult, RecordingStatus, RuleId, RuleRecordingType,
    Schedule, ScheduleId, ScheduleRecordingType, ScheduleRule,
};

use super::rules::RuleRegistry;
use crate::engine::expander;
use crate::engine::rules::{matching_programs, CompiledRule};
use crate::engine::{
    self, EngineSettings, EpisodeDeduplicator, MovedProgram, Occurrence, OccurrenceSource,
    OccurrenceState, ScheduleCache,
};
use crate::notify::{Notifier, ScheduleEvent};
use crate::provider::Backend;

/// Longest accepted check interval.
const MAX_INTERVAL_SECS: u64 = 7 * 24 * 3600;

fn interval_duration(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_INTERVAL_SECS) as i64)
}

/// Errors surfaced to callers of the evaluator.
#[derive(Error, Debug)]
pub enum EvaluatorError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Unknown schedule rule: {0}")]
    UnknownRule(RuleId),

    #[error("Unknown schedule: {0}")]
    UnknownSchedule(ScheduleId),
}

/// Evaluator configuration (`[evaluator]` section).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Days covered by a full check.
    pub lookahead_days: u32,
    /// Timer tick, in seconds.
    pub check_interval_secs: u64,
    pub full_check_interval_secs: u64,
    pub pre_check_interval_secs: u64,
    pub detect_moved_programs: bool,
    /// Search radius around a nominal start, in minutes.
    pub moved_window_minutes: u32,
    /// Moved schedules are recreated this many minutes before they start.
    pub moved_offset_minutes: u32,
    pub episode_management: EpisodeManagementScheme,
    pub skip_duplicate_recordings: bool,
    pub auto_resolve_conflicts: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            lookahead_days: 14,
            check_interval_secs: 60,
            full_check_interval_secs: 3600,  // 1 hour
            pre_check_interval_secs: 300,    // 5 minutes
            detect_moved_programs: false,
            moved_window_minutes: 30,
            moved_offset_minutes: 30,
            episode_management: EpisodeManagementScheme::None,
            skip_duplicate_recordings: false,
            auto_resolve_conflicts: true,
        }
    }
}

impl EvaluatorConfig {
    pub fn lookahead(&self) -> Duration {
        Duration::days(i64::from(self.lookahead_days.max(1)))
    }

    pub fn moved_offset(&self) -> Duration {
        Duration::minutes(i64::from(self.moved_offset_minutes))
    }

    /// Window of a pre-check: one pre-check interval plus the moved-program offset.
    pub fn pre_check_horizon(&self) -> Duration {
        interval_duration(self.pre_check_interval_secs) + self.moved_offset()
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            detect_moved_programs: self.detect_moved_programs,
            moved_window: Duration::minutes(i64::from(self.moved_window_minutes)),
            auto_resolve_conflicts: self.auto_resolve_conflicts,
        }
    }

    fn deduplicator(&self) -> EpisodeDeduplicator {
        EpisodeDeduplicator::new(self.episode_management, self.skip_duplicate_recordings)
    }
}

/// Kind of evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Whole lookahead window; replaces the persisted conflict set.
    Full,
    /// Only what starts within the pre-check horizon.
    Pre,
}

/// Check bookkeeping, owned by whoever holds the pass guard.
#[derive(Debug, Clone, Default)]
pub struct EvaluatorState {
    pub next_full_check: Option<NaiveDateTime>,
    pub next_pre_check: Option<NaiveDateTime>,
    /// Cleared by every mutation; a stale cache forces a full check.
    pub cache_up_to_date: bool,
    /// Rule revision the last pass saw.
    pub rule_revision: u64,
}

impl EvaluatorState {
    /// Which check, if any, is due at `now`.
    pub fn due_mode(&self, now: NaiveDateTime, rule_revision: u64) -> Option<CheckMode> {
        let full_due = !self.cache_up_to_date
            || self.rule_revision != rule_revision
            || self.next_full_check.map_or(true, |t| now >= t);
        if full_due {
            return Some(CheckMode::Full);
        }
        if self.next_pre_check.map_or(true, |t| now >= t) {
            return Some(CheckMode::Pre);
        }
        None
    }
}

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler is running.
    Running,
    /// Scheduler is stopped.
    Stopped,
}

/// An occurrence that holds a card after the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedOccurrence {
    pub schedule_id: ScheduleId,
    pub card_id: CardId,
    pub channel_id: ChannelId,
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub program_id: Option<ProgramId>,
}

/// Everything one pass decided and persisted.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub mode: CheckMode,
    pub now: NaiveDateTime,
    pub window_end: NaiveDateTime,
    pub assigned: Vec<AssignedOccurrence>,
    pub states: Vec<(ScheduleId, NaiveDateTime, OccurrenceState)>,
    pub conflicts: Vec<Conflict>,
    /// Whether `conflicts` replaced the persisted set.
    pub conflicts_persisted: bool,
    pub moved: Vec<MovedProgram>,
    pub canceled: Vec<CanceledSchedule>,
    pub created_schedules: Vec<ScheduleId>,
    pub removed_schedules: Vec<ScheduleId>,
    pub degraded: bool,
}

impl PassOutcome {
    fn from_cache(mode: CheckMode, cache: &ScheduleCache) -> Self {
        let assigned = cache
            .assignments
            .iter()
            .map(|a| {
                let (start, end) = a.occurrence.effective_range();
                AssignedOccurrence {
                    schedule_id: a.occurrence.schedule_id(),
                    card_id: a.card_id,
                    channel_id: a.occurrence.channel_id,
                    name: a.occurrence.name.clone(),
                    start,
                    end,
                    program_id: a.occurrence.program_id(),
                }
            })
            .collect();

        Self {
            mode,
            now: cache.now,
            window_end: cache.window_end,
            assigned,
            states: cache.final_states(),
            conflicts: cache.conflicts.clone(),
            conflicts_persisted: false,
            moved: cache.moved.clone(),
            canceled: Vec::new(),
            created_schedules: Vec::new(),
            removed_schedules: Vec::new(),
            degraded: cache.degraded,
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    last_pass: Option<Arc<PassOutcome>>,
    /// Conflict set last written to the store.
    conflicts: Option<Vec<Conflict>>,
}

fn same_conflicts(a: &[Conflict], b: &[Conflict]) -> bool {
    a.len() == b.len()
        && a.iter().all(|x| b.iter().any(|y| x.same_as(y)))
        && b.iter().all(|y| a.iter().any(|x| x.same_as(y)))
}

/// Persisted schedule materialized from a rule occurrence.
fn rule_schedule(rule: &ScheduleRule, occurrence: &Occurrence) -> Schedule {
    let (start, end) = occurrence.effective_range();
    let mut schedule = Schedule::new(
        0,
        occurrence.channel_id,
        occurrence.name.clone(),
        start,
        end,
        ScheduleRecordingType::Once,
    )
    .with_priority(rule.priority)
    .with_padding(rule.pre_record_minutes, rule.post_record_minutes);
    schedule.rule_id = Some(rule.id);
    schedule.keep_method = rule.keep_method;
    schedule.keep_date = rule.keep_date;
    schedule
}

/// Periodic evaluator.
pub struct PeriodicEvaluator {
    backend: Backend,
    registry: Arc<RuleRegistry>,
    notifier: Notifier,
    config: EvaluatorConfig,
    /// Held for the whole pass.
    pass_guard: Mutex<EvaluatorState>,
    state: Mutex<SchedulerState>,
    invalidated: AtomicBool,
    completed_passes: AtomicU64,
    snapshot: RwLock<Snapshot>,
}

impl PeriodicEvaluator {
    pub fn new(
        backend: Backend,
        registry: Arc<RuleRegistry>,
        notifier: Notifier,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            notifier,
            config,
            pass_guard: Mutex::new(EvaluatorState::default()),
            state: Mutex::new(SchedulerState::Running),
            invalidated: AtomicBool::new(false),
            completed_passes: AtomicU64::new(0),
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Start the evaluator loop.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            "PeriodicEvaluator: Starting with check interval {} seconds",
            self.config.check_interval_secs
        );

        let mut ticker = interval(std::time::Duration::from_secs(
            self.config.check_interval_secs.clamp(1, MAX_INTERVAL_SECS),
        ));

        loop {
            ticker.tick().await;

            if *self.state.lock().await == SchedulerState::Stopped {
                info!("PeriodicEvaluator: Stopped");
                break;
            }

            self.tick_at(Local::now().naive_local()).await;
        }
    }

    /// Handle one timer tick. Skipped while another pass is running.
    pub async fn tick_at(&self, now: NaiveDateTime) -> Option<Arc<PassOutcome>> {
        let Ok(mut state) = self.pass_guard.try_lock() else {
            debug!("PeriodicEvaluator: Pass in progress, skipping tick");
            return None;
        };

        if self.invalidated.swap(false, Ordering::SeqCst) {
            state.cache_up_to_date = false;
        }
        let mode = state.due_mode(now, self.registry.revision())?;
        Some(self.run_pass(&mut state, mode, now).await)
    }

    /// Run a full check right away.
    ///
    /// If a pass is already running, wait for it and return its outcome.
    pub async fn evaluate_now(&self) -> Arc<PassOutcome> {
        self.evaluate_now_at(Local::now().naive_local()).await
    }

    pub async fn evaluate_now_at(&self, now: NaiveDateTime) -> Arc<PassOutcome> {
        let seen = self.completed_passes.load(Ordering::SeqCst);
        let mut state = self.pass_guard.lock().await;

        if self.completed_passes.load(Ordering::SeqCst) != seen {
            if let Some(outcome) = self.last_pass().await {
                debug!("PeriodicEvaluator: Returning the outcome of the pass just finished");
                return outcome;
            }
        }

        self.invalidated.store(false, Ordering::SeqCst);
        self.run_pass(&mut state, CheckMode::Full, now).await
    }

    /// Outcome of the last completed pass.
    pub async fn last_pass(&self) -> Option<Arc<PassOutcome>> {
        self.snapshot.read().await.last_pass.clone()
    }

    /// Number of passes completed since start-up.
    pub fn completed_passes(&self) -> u64 {
        self.completed_passes.load(Ordering::SeqCst)
    }

    /// Force the next tick to run a full check.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
        debug!("PeriodicEvaluator: Cache invalidated");
    }

    /// Conflict set last written to the store, else whatever the store holds.
    async fn persisted_conflicts(&self) -> Vec<Conflict> {
        let persisted = self.snapshot.read().await.conflicts.clone();
        match persisted {
            Some(conflicts) => conflicts,
            None => self.backend.conflicts.conflicts().await.unwrap_or_else(|e| {
                warn!("PeriodicEvaluator: Failed to read conflicts: {}", e);
                Vec::new()
            }),
        }
    }

    /// Persisted conflicts involving `schedule_id`.
    pub async fn conflicts_for_schedule(&self, schedule_id: ScheduleId) -> Vec<Conflict> {
        self.persisted_conflicts()
            .await
            .into_iter()
            .filter(|c| c.involves(schedule_id))
            .collect()
    }

    /// Persisted conflicts involving rule `rule_id`, either through its
    /// unmaterialized matches or through schedules it created.
    pub async fn conflicts_for_rule(&self, rule_id: RuleId) -> Vec<Conflict> {
        let mut ids: HashSet<ScheduleId> = HashSet::from([-rule_id]);
        match self.backend.schedules.schedules().await {
            Ok(schedules) => ids.extend(
                schedules
                    .iter()
                    .filter(|s| s.rule_id == Some(rule_id))
                    .map(|s| s.id),
            ),
            Err(e) => warn!(
                "PeriodicEvaluator: Failed to read schedules of rule {}: {}",
                rule_id, e
            ),
        }

        self.persisted_conflicts()
            .await
            .into_iter()
            .filter(|c| ids.iter().any(|id| c.involves(*id)))
            .collect()
    }

    /// Programs within the lookahead window that schedule `schedule_id` records.
    ///
    /// Canceled occurrences and time-based occurrences without a listing
    /// entry contribute nothing.
    pub async fn programs_for_schedule(
        &self,
        schedule_id: ScheduleId,
        now: NaiveDateTime,
    ) -> Result<Vec<Program>, EvaluatorError> {
        let schedule = self
            .backend
            .schedules
            .schedule(schedule_id)
            .await?
            .ok_or(EvaluatorError::UnknownSchedule(schedule_id))?;

        let mut cache = ScheduleCache::load(
            self.backend.clone(),
            now,
            now + self.config.lookahead(),
            self.config.deduplicator(),
        )
        .await;
        cache.schedules = vec![schedule];

        let mut seen = HashSet::new();
        Ok(expander::expand(&mut cache)
            .await
            .into_iter()
            .filter_map(|o| o.program)
            .filter(|p| seen.insert(p.id))
            .collect())
    }

    /// Programs within the lookahead window that rule `rule_id` would record.
    pub async fn programs_for_rule(
        &self,
        rule_id: RuleId,
        now: NaiveDateTime,
    ) -> Result<Vec<Program>, EvaluatorError> {
        let view = self.registry.read().await;
        let rule = view
            .get(rule_id)
            .await?
            .ok_or(EvaluatorError::UnknownRule(rule_id))?;

        let mut cache = ScheduleCache::load(
            self.backend.clone(),
            now,
            now + self.config.lookahead(),
            self.config.deduplicator(),
        )
        .await;
        let compiled = CompiledRule::new(rule);
        Ok(matching_programs(&mut cache, &compiled)
            .await
            .into_iter()
            .map(|(program, _)| program)
            .collect())
    }

    async fn run_pass(
        &self,
        state: &mut EvaluatorState,
        mode: CheckMode,
        now: NaiveDateTime,
    ) -> Arc<PassOutcome> {
        let horizon = self.config.pre_check_horizon();
        let window_end = match mode {
            CheckMode::Full => now + self.config.lookahead(),
            CheckMode::Pre => now + horizon,
        };
        debug!("PeriodicEvaluator: {:?} check for {} .. {}", mode, now, window_end);

        let mut cache = ScheduleCache::load(
            self.backend.clone(),
            now,
            window_end,
            self.config.deduplicator(),
        )
        .await;

        let (rules, revision) = {
            let view = self.registry.read().await;
            let revision = self.registry.revision();
            // inactive rules still describe the schedules they created
            let rules = match view.all().await {
                Ok(rules) => rules,
                Err(e) => {
                    warn!("PeriodicEvaluator: Failed to read schedule rules: {}", e);
                    cache.degraded = true;
                    Vec::new()
                }
            };
            engine::run(&mut cache, &rules, &self.config.engine_settings()).await;
            (rules, revision)
        };

        let mut outcome = PassOutcome::from_cache(mode, &cache);

        if mode == CheckMode::Full {
            if cache.degraded {
                warn!("PeriodicEvaluator: Collaborators unavailable, keeping the persisted conflict set");
            } else {
                outcome.conflicts_persisted = self.persist_conflicts(&cache.conflicts).await;
                self.publish_statuses(&cache).await;
            }
        }

        let mut mutated = false;
        mutated |= self.cancel_suppressed(&cache, now + horizon, &mut outcome).await;
        mutated |= self
            .recreate_moved(&cache, now + self.config.moved_offset(), &mut outcome)
            .await;
        mutated |= self
            .materialize_rules(&cache, &rules, now + horizon, &mut outcome)
            .await;
        mutated |= self.remove_aired(&cache, now, &mut outcome).await;

        if mode == CheckMode::Full {
            state.next_full_check = Some(now + interval_duration(self.config.full_check_interval_secs));
            state.cache_up_to_date = !cache.degraded;
        }
        if mutated {
            state.cache_up_to_date = false;
        }
        state.rule_revision = revision;
        state.next_pre_check = Some(self.next_pre_check(&cache, now));

        info!(
            "PeriodicEvaluator: {:?} check done, {} assigned, {} conflict(s), {} created, {} removed",
            mode,
            outcome.assigned.len(),
            outcome.conflicts.len(),
            outcome.created_schedules.len(),
            outcome.removed_schedules.len()
        );

        let outcome = Arc::new(outcome);
        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.last_pass = Some(Arc::clone(&outcome));
            if outcome.conflicts_persisted {
                snapshot.conflicts = Some(outcome.conflicts.clone());
            }
        }
        self.completed_passes.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Earlier of the pre-check cooldown and the next occurrence boundary.
    fn next_pre_check(&self, cache: &ScheduleCache, now: NaiveDateTime) -> NaiveDateTime {
        let cooldown = now + interval_duration(self.config.pre_check_interval_secs);
        let offset = self.config.moved_offset();

        cache
            .assignments
            .iter()
            .map(|a| &a.occurrence)
            .chain(cache.unassigned.iter())
            .map(|o| o.padded_range().0 - offset)
            .filter(|t| *t > now)
            .fold(cooldown, |next, t| next.min(t))
    }

    /// Replace the persisted conflict set; `false` leaves the previous one in place.
    async fn persist_conflicts(&self, conflicts: &[Conflict]) -> bool {
        let previous = match self.backend.conflicts.conflicts().await {
            Ok(previous) => previous,
            Err(e) => {
                warn!("PeriodicEvaluator: Failed to read previous conflicts: {}", e);
                self.snapshot.read().await.conflicts.clone().unwrap_or_default()
            }
        };

        if let Err(e) = self.backend.conflicts.replace_conflicts(conflicts).await {
            error!(
                "PeriodicEvaluator: Failed to persist {} conflict(s), keeping the previous set: {}",
                conflicts.len(),
                e
            );
            return false;
        }

        if !same_conflicts(&previous, conflicts) {
            self.notifier.publish(ScheduleEvent::ConflictsChanged {
                count: conflicts.len(),
            });
        }
        true
    }

    async fn publish_statuses(&self, cache: &ScheduleCache) {
        let from_rules: HashSet<ScheduleId> = cache
            .schedules
            .iter()
            .filter(|s| s.rule_id.is_some())
            .map(|s| s.id)
            .collect();

        let mut statuses: HashMap<ProgramId, RecordingStatus> = HashMap::new();
        for assignment in &cache.assignments {
            let occurrence = &assignment.occurrence;
            let Some(program_id) = occurrence.program_id() else {
                continue;
            };
            let status = statuses.entry(program_id).or_default();
            status.insert(RecordingStatus::SCHEDULED);
            if occurrence.is_series {
                status.insert(RecordingStatus::SERIES_SCHEDULED);
            }
            if occurrence.source.is_rule() || from_rules.contains(&occurrence.schedule_id()) {
                status.insert(RecordingStatus::RULE_SCHEDULED);
            }
        }
        for occurrence in &cache.unassigned {
            if let Some(program_id) = occurrence.program_id() {
                statuses
                    .entry(program_id)
                    .or_default()
                    .insert(RecordingStatus::CONFLICT);
            }
        }

        let mut statuses: Vec<(ProgramId, RecordingStatus)> = statuses.into_iter().collect();
        statuses.sort_by_key(|(id, _)| *id);
        if let Err(e) = self.backend.programs.update_recording_statuses(&statuses).await {
            warn!("PeriodicEvaluator: Failed to update recording statuses: {}", e);
        }
    }

    /// Cancel suppressed occurrences of persisted schedules starting before `due_before`.
    async fn cancel_suppressed(
        &self,
        cache: &ScheduleCache,
        due_before: NaiveDateTime,
        outcome: &mut PassOutcome,
    ) -> bool {
        let mut mutated = false;

        for occurrence in &cache.suppressed {
            let OccurrenceSource::Schedule(schedule_id) = occurrence.source else {
                continue;
            };
            if occurrence.padded_range().0 > due_before {
                continue;
            }
            let Some(schedule) = cache.schedules.iter().find(|s| s.id == schedule_id) else {
                continue;
            };

            let canceled = CanceledSchedule {
                schedule_id,
                start: occurrence.start,
            };
            let recurring = schedule.recording_type.is_recurring();
            let result = if recurring {
                self.backend
                    .schedules
                    .cancel_occurrence(canceled)
                    .await
                    .map(|_| true)
            } else {
                self.backend.schedules.remove_schedule(schedule_id).await
            };

            match result {
                Ok(true) => {
                    info!(
                        "PeriodicEvaluator: Canceled {:?} at {} (schedule {})",
                        occurrence.name, occurrence.start, schedule_id
                    );
                    mutated = true;
                    outcome.canceled.push(canceled);
                    if !recurring {
                        outcome.removed_schedules.push(schedule_id);
                    }
                    self.notifier.publish(ScheduleEvent::ScheduleCanceled {
                        schedule_id,
                        start: occurrence.start,
                    });
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "PeriodicEvaluator: Failed to cancel schedule {} at {}: {}",
                    schedule_id, occurrence.start, e
                ),
            }
        }
        mutated
    }

    async fn recreate(&self, schedule: &Schedule, moved: &MovedProgram) -> ProviderResult<ScheduleId> {
        let mut replacement = schedule.clone();
        replacement.id = 0;
        replacement.start = moved.program.start;
        replacement.end = moved.program.end;
        replacement.recording_type = ScheduleRecordingType::Once;

        if schedule.recording_type.is_recurring() {
            self.backend
                .schedules
                .cancel_occurrence(CanceledSchedule {
                    schedule_id: schedule.id,
                    start: moved.nominal_start,
                })
                .await?;
            replacement.parent_id = Some(schedule.id);
        } else {
            self.backend.schedules.remove_schedule(schedule.id).await?;
        }
        self.backend.schedules.create_schedule(&replacement).await
    }

    /// Recreate moved schedules at their listing time once due within the offset.
    async fn recreate_moved(
        &self,
        cache: &ScheduleCache,
        due_before: NaiveDateTime,
        outcome: &mut PassOutcome,
    ) -> bool {
        let mut mutated = false;

        for moved in &cache.moved {
            if moved.nominal_start.min(moved.program.start) > due_before {
                continue;
            }
            let suppressed = cache
                .suppressed
                .iter()
                .any(|o| o.schedule_id() == moved.schedule_id && o.start == moved.nominal_start);
            if suppressed {
                continue;
            }
            let Some(schedule) = cache.schedules.iter().find(|s| s.id == moved.schedule_id) else {
                continue;
            };

            match self.recreate(schedule, moved).await {
                Ok(new_schedule_id) => {
                    info!(
                        "PeriodicEvaluator: Schedule {} ({}) moved from {} to {}, recreated as {}",
                        schedule.id, schedule.name, moved.nominal_start, moved.program.start, new_schedule_id
                    );
                    mutated = true;
                    outcome.created_schedules.push(new_schedule_id);
                    if !schedule.recording_type.is_recurring() {
                        outcome.removed_schedules.push(schedule.id);
                    }
                    self.notifier.publish(ScheduleEvent::ScheduleMoved {
                        schedule_id: schedule.id,
                        new_schedule_id,
                        nominal_start: moved.nominal_start,
                        actual_start: moved.program.start,
                    });
                }
                Err(e) => {
                    // the store may already hold part of the move
                    mutated = true;
                    warn!(
                        "PeriodicEvaluator: Failed to recreate moved schedule {}: {}",
                        schedule.id, e
                    );
                }
            }
        }
        mutated
    }

    /// Persist due rule occurrences as Once schedules.
    async fn materialize_rules(
        &self,
        cache: &ScheduleCache,
        rules: &[ScheduleRule],
        due_before: NaiveDateTime,
        outcome: &mut PassOutcome,
    ) -> bool {
        let mut pending: Vec<&Occurrence> = cache
            .assignments
            .iter()
            .map(|a| &a.occurrence)
            .chain(cache.unassigned.iter())
            .chain(cache.replaced.iter())
            .filter(|o| o.source.is_rule() && o.padded_range().0 <= due_before)
            .collect();
        pending.sort_by_key(|o| (o.start, o.channel_id));

        let mut materialized: HashSet<ProgramId> = HashSet::new();
        let mut fired: HashSet<RuleId> = HashSet::new();
        let mut mutated = false;

        for occurrence in pending {
            let OccurrenceSource::Rule(rule_id) = occurrence.source else {
                continue;
            };
            let Some(rule) = rules.iter().find(|r| r.id == rule_id) else {
                continue;
            };
            if rule.recording_type == RuleRecordingType::Once && fired.contains(&rule_id) {
                continue;
            }
            if let Some(program_id) = occurrence.program_id() {
                if !materialized.insert(program_id) {
                    continue;
                }
            }

            let schedule = rule_schedule(rule, occurrence);
            let schedule_id = match self.backend.schedules.create_schedule(&schedule).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(
                        "PeriodicEvaluator: Failed to persist {:?} at {} for rule {}: {}",
                        schedule.name, schedule.start, rule_id, e
                    );
                    continue;
                }
            };
            info!(
                "PeriodicEvaluator: Rule {} ({}) scheduled {:?} at {} as {}",
                rule_id, rule.name, schedule.name, schedule.start, schedule_id
            );
            mutated = true;
            outcome.created_schedules.push(schedule_id);
            self.notifier.publish(ScheduleEvent::RuleScheduleCreated {
                rule_id,
                schedule_id,
            });

            if fired.insert(rule_id) {
                self.settle_rule(rule, occurrence).await;
            }
        }
        mutated
    }

    /// Deactivate a Once rule and pin the unset channel/day of pinning rules
    /// after their first materialized match.
    async fn settle_rule(&self, rule: &ScheduleRule, first: &Occurrence) {
        let once = rule.recording_type == RuleRecordingType::Once;
        let pin_channel = rule.recording_type.pins_channel() && rule.channel_id.is_none();
        let pin_day = rule.recording_type.pins_day() && rule.on_or_after_day.is_none();
        if !(once || pin_channel || pin_day) {
            return;
        }

        let channel_id = first.channel_id;
        let day = weekday_of(first.start);
        let result = self
            .registry
            .modify(rule.id, |r| {
                if once {
                    r.active = false;
                }
                if pin_channel {
                    r.channel_id = Some(channel_id);
                }
                if pin_day {
                    r.on_or_after_day = Some(day);
                    r.on_or_before_day = Some(day);
                }
            })
            .await;

        match result {
            Ok(true) => debug!("PeriodicEvaluator: Rule {} settled after first match", rule.id),
            Ok(false) => debug!("PeriodicEvaluator: Rule {} vanished before it could be settled", rule.id),
            Err(e) => warn!("PeriodicEvaluator: Failed to update rule {}: {}", rule.id, e),
        }
    }

    /// Remove Once schedules that have fully aired.
    async fn remove_aired(
        &self,
        cache: &ScheduleCache,
        now: NaiveDateTime,
        outcome: &mut PassOutcome,
    ) -> bool {
        let mut mutated = false;

        for schedule in cache
            .schedules
            .iter()
            .filter(|s| s.recording_type == ScheduleRecordingType::Once && s.padded_end() <= now)
        {
            match self.backend.schedules.remove_schedule(schedule.id).await {
                Ok(true) => {
                    info!(
                        "PeriodicEvaluator: Removed aired schedule {} ({})",
                        schedule.id, schedule.name
                    );
                    mutated = true;
                    outcome.removed_schedules.push(schedule.id);
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "PeriodicEvaluator: Failed to remove aired schedule {}: {}",
                    schedule.id, e
                ),
            }
        }
        mutated
    }

    /// Stop the evaluator.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        *state = SchedulerState::Stopped;
        info!("PeriodicEvaluator: Stop requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{at, dvbt, MemoryBackend};
    use tokio::sync::broadcast;
    use tunersched_protocol::{Card, Channel, Recording, RuleSearchMatch, RuleSearchTarget};

    fn evaluator(
        memory: &Arc<MemoryBackend>,
        config: EvaluatorConfig,
    ) -> (PeriodicEvaluator, broadcast::Receiver<ScheduleEvent>) {
        let backend = memory.backend();
        let registry = Arc::new(RuleRegistry::new(Arc::clone(&backend.rules)));
        let notifier = Notifier::new(64);
        let events = notifier.subscribe();
        (PeriodicEvaluator::new(backend, registry, notifier, config), events)
    }

    fn drain(events: &mut broadcast::Receiver<ScheduleEvent>) -> Vec<ScheduleEvent> {
        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        received
    }

    /// One card receiving channels 1 and 2.
    fn tuner() -> Arc<MemoryBackend> {
        let memory = MemoryBackend::new();
        memory.add_card(Card::new(1, "C1", 10));
        memory.add_channel(Channel::new(1, "A"));
        memory.add_channel(Channel::new(2, "B"));
        memory.add_tuning(1, dvbt(1, 506, false));
        memory.add_tuning(1, dvbt(2, 522, false));
        memory
    }

    fn moved_config() -> EvaluatorConfig {
        EvaluatorConfig {
            detect_moved_programs: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_due_mode() {
        let mut state = EvaluatorState::default();
        assert_eq!(state.due_mode(at(2, 12, 0), 0), Some(CheckMode::Full));

        state.cache_up_to_date = true;
        state.next_full_check = Some(at(2, 13, 0));
        state.next_pre_check = Some(at(2, 12, 5));
        assert_eq!(state.due_mode(at(2, 12, 0), 0), None);
        assert_eq!(state.due_mode(at(2, 12, 5), 0), Some(CheckMode::Pre));
        assert_eq!(state.due_mode(at(2, 13, 0), 0), Some(CheckMode::Full));
        assert_eq!(state.due_mode(at(2, 12, 0), 1), Some(CheckMode::Full));
    }

    #[test]
    fn test_config_defaults() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.lookahead(), Duration::days(14));
        assert_eq!(config.pre_check_horizon(), Duration::minutes(35));
        assert!(config.engine_settings().auto_resolve_conflicts);
        assert!(!config.engine_settings().detect_moved_programs);
    }

    #[tokio::test]
    async fn test_moved_once_schedule_recreated() {
        let memory = tuner();
        let original = memory.add_schedule(Schedule::new(
            0,
            1,
            "Film",
            at(2, 20, 0),
            at(2, 21, 0),
            ScheduleRecordingType::Once,
        ));
        memory.add_program(Program::new(1, 1, at(2, 20, 20), at(2, 21, 20), "Film"));
        let (evaluator, mut events) = evaluator(&memory, moved_config());

        let outcome = evaluator.evaluate_now_at(at(2, 19, 45)).await;
        assert_eq!(outcome.moved.len(), 1);
        assert_eq!(outcome.removed_schedules, vec![original]);

        let schedules = memory.schedules();
        assert_eq!(schedules.len(), 1);
        let replacement = &schedules[0];
        assert_ne!(replacement.id, original);
        assert_eq!(replacement.start, at(2, 20, 20));
        assert_eq!(replacement.end, at(2, 21, 20));
        assert_eq!(replacement.recording_type, ScheduleRecordingType::Once);
        assert_eq!(outcome.created_schedules, vec![replacement.id]);

        assert!(drain(&mut events).contains(&ScheduleEvent::ScheduleMoved {
            schedule_id: original,
            new_schedule_id: replacement.id,
            nominal_start: at(2, 20, 0),
            actual_start: at(2, 20, 20),
        }));

        // the recreated schedule matches the listing; nothing moves again
        let outcome = evaluator.tick_at(at(2, 19, 46)).await.unwrap();
        assert!(outcome.moved.is_empty());
        assert_eq!(memory.schedules().len(), 1);
    }

    #[tokio::test]
    async fn test_moved_recurring_splits_child() {
        let memory = tuner();
        let daily = memory.add_schedule(Schedule::new(
            0,
            1,
            "Film",
            at(1, 20, 0),
            at(1, 21, 0),
            ScheduleRecordingType::Daily,
        ));
        memory.add_program(Program::new(1, 1, at(2, 20, 20), at(2, 21, 20), "Film"));
        let (evaluator, _events) = evaluator(&memory, moved_config());

        evaluator.evaluate_now_at(at(2, 19, 45)).await;

        let canceled = memory.with(|s| s.canceled.clone());
        assert_eq!(
            canceled,
            vec![CanceledSchedule {
                schedule_id: daily,
                start: at(2, 20, 0),
            }]
        );
        let child = memory
            .schedules()
            .into_iter()
            .find(|s| s.parent_id == Some(daily))
            .unwrap();
        assert_eq!(child.start, at(2, 20, 20));
        assert_eq!(child.recording_type, ScheduleRecordingType::Once);
    }

    #[tokio::test]
    async fn test_move_not_due_is_left_alone() {
        let memory = tuner();
        memory.add_schedule(Schedule::new(
            0,
            1,
            "Film",
            at(2, 20, 0),
            at(2, 21, 0),
            ScheduleRecordingType::Once,
        ));
        memory.add_program(Program::new(1, 1, at(2, 20, 20), at(2, 21, 20), "Film"));
        let (evaluator, _events) = evaluator(&memory, moved_config());

        let outcome = evaluator.evaluate_now_at(at(2, 12, 0)).await;
        assert_eq!(outcome.moved.len(), 1);
        assert!(outcome.created_schedules.is_empty());
        assert_eq!(memory.schedules()[0].start, at(2, 20, 0));
    }

    #[tokio::test]
    async fn test_once_rule_deactivates_after_firing() {
        let memory = tuner();
        memory.add_program(Program::new(1, 2, at(2, 18, 0), at(2, 18, 30), "Evening News"));
        let mut rule = ScheduleRule::new(0, "News").with_target(
            RuleSearchTarget::Title,
            RuleSearchMatch::Include,
            "news",
        );
        rule.recording_type = RuleRecordingType::Once;
        let rule_id = memory.add_rule(rule);
        let (evaluator, mut events) = evaluator(&memory, EvaluatorConfig::default());

        evaluator.evaluate_now_at(at(2, 17, 50)).await;

        let schedules = memory.schedules();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].rule_id, Some(rule_id));
        assert_eq!(schedules[0].channel_id, 2);
        assert_eq!(schedules[0].start, at(2, 18, 0));
        assert_eq!(schedules[0].recording_type, ScheduleRecordingType::Once);
        assert!(!memory.rules()[0].active);
        assert!(drain(&mut events).contains(&ScheduleEvent::RuleScheduleCreated {
            rule_id,
            schedule_id: schedules[0].id,
        }));
    }

    #[tokio::test]
    async fn test_rule_not_due_is_not_materialized() {
        let memory = tuner();
        memory.add_program(Program::new(1, 2, at(2, 18, 0), at(2, 18, 30), "Evening News"));
        memory.add_rule(ScheduleRule::new(0, "News").with_target(
            RuleSearchTarget::Title,
            RuleSearchMatch::Include,
            "news",
        ));
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        let outcome = evaluator.evaluate_now_at(at(2, 12, 0)).await;
        assert_eq!(outcome.assigned.len(), 1);
        assert_eq!(outcome.assigned[0].schedule_id, -1);
        assert!(memory.schedules().is_empty());
        assert!(memory.rules()[0].active);
    }

    #[tokio::test]
    async fn test_same_channel_rule_pins_first_match() {
        let memory = tuner();
        memory.add_program(Program::new(1, 2, at(2, 18, 0), at(2, 18, 30), "Quiz"));
        memory.add_program(Program::new(2, 1, at(2, 19, 0), at(2, 19, 30), "Quiz"));
        let mut rule = ScheduleRule::new(0, "Quiz").with_target(
            RuleSearchTarget::Title,
            RuleSearchMatch::Exact,
            "Quiz",
        );
        rule.recording_type = RuleRecordingType::AllOnSameChannel;
        memory.add_rule(rule);
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        evaluator.evaluate_now_at(at(2, 17, 50)).await;

        let rules = memory.rules();
        assert_eq!(rules[0].channel_id, Some(2));
        assert!(rules[0].active);
        let schedules = memory.schedules();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].channel_id, 2);
    }

    #[tokio::test]
    async fn test_rule_restart_creates_no_duplicates() {
        let memory = tuner();
        memory.add_program(Program::new(1, 2, at(2, 18, 0), at(2, 18, 30), "Evening News"));
        memory.add_rule(ScheduleRule::new(0, "News").with_target(
            RuleSearchTarget::Title,
            RuleSearchMatch::Include,
            "news",
        ));

        let (first, _events) = evaluator(&memory, EvaluatorConfig::default());
        first.evaluate_now_at(at(2, 17, 50)).await;
        first.evaluate_now_at(at(2, 17, 51)).await;
        assert_eq!(memory.schedules().len(), 1);

        // a restarted evaluator starts from a clean state
        let (restarted, _events) = evaluator(&memory, EvaluatorConfig::default());
        let outcome = restarted.evaluate_now_at(at(2, 17, 52)).await;
        assert_eq!(memory.schedules().len(), 1);
        assert!(outcome.created_schedules.is_empty());
        assert_eq!(outcome.assigned.len(), 1);
        assert!(outcome.assigned[0].schedule_id > 0);
    }

    #[tokio::test]
    async fn test_suppressed_once_schedule_removed() {
        let memory = tuner();
        let film = memory.add_schedule(Schedule::new(
            0,
            1,
            "Film",
            at(2, 20, 0),
            at(2, 21, 0),
            ScheduleRecordingType::Once,
        ));
        memory.with(|s| {
            s.recordings.push(Recording {
                id: 1,
                channel_id: Some(1),
                title: "Film".into(),
                start: at(1, 20, 0),
                end: at(1, 21, 0),
            })
        });
        let config = EvaluatorConfig {
            skip_duplicate_recordings: true,
            ..Default::default()
        };
        let (evaluator, mut events) = evaluator(&memory, config);

        let outcome = evaluator.evaluate_now_at(at(2, 19, 45)).await;
        assert!(outcome.assigned.is_empty());
        assert_eq!(outcome.removed_schedules, vec![film]);
        assert!(memory.schedules().is_empty());
        assert!(drain(&mut events).contains(&ScheduleEvent::ScheduleCanceled {
            schedule_id: film,
            start: at(2, 20, 0),
        }));
    }

    #[tokio::test]
    async fn test_aired_once_schedule_removed() {
        let memory = tuner();
        let aired = memory.add_schedule(Schedule::new(
            0,
            1,
            "Old",
            at(1, 20, 0),
            at(1, 21, 0),
            ScheduleRecordingType::Once,
        ));
        let upcoming = memory.add_schedule(Schedule::new(
            0,
            1,
            "New",
            at(3, 20, 0),
            at(3, 21, 0),
            ScheduleRecordingType::Once,
        ));
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        let outcome = evaluator.evaluate_now_at(at(2, 12, 0)).await;
        assert_eq!(outcome.removed_schedules, vec![aired]);
        let remaining: Vec<ScheduleId> = memory.schedules().iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![upcoming]);
    }

    #[tokio::test]
    async fn test_conflicts_persisted_and_announced() {
        let memory = tuner();
        let s1 = memory.add_schedule(
            Schedule::new(0, 1, "S1", at(2, 20, 0), at(2, 21, 0), ScheduleRecordingType::Once)
                .with_priority(5),
        );
        let s2 = memory.add_schedule(
            Schedule::new(0, 2, "S2", at(2, 20, 30), at(2, 21, 30), ScheduleRecordingType::Once)
                .with_priority(8),
        );
        let (evaluator, mut events) = evaluator(&memory, EvaluatorConfig::default());

        let outcome = evaluator.evaluate_now_at(at(2, 12, 0)).await;
        assert!(outcome.conflicts_persisted);
        assert_eq!(memory.conflicts().len(), 1);
        assert_eq!(memory.conflicts()[0].schedule_id, s1);
        assert_eq!(memory.conflicts()[0].conflicting_schedule_id, Some(s2));
        assert_eq!(evaluator.conflicts_for_schedule(s2).await.len(), 1);
        assert!(drain(&mut events).contains(&ScheduleEvent::ConflictsChanged { count: 1 }));

        // an unchanged set is rewritten without an announcement
        evaluator.evaluate_now_at(at(2, 12, 1)).await;
        assert_eq!(memory.with(|s| s.conflict_writes), 2);
        assert!(drain(&mut events)
            .iter()
            .all(|e| !matches!(e, ScheduleEvent::ConflictsChanged { .. })));
    }

    #[tokio::test]
    async fn test_failed_conflict_write_keeps_previous_set() {
        let memory = tuner();
        let s1 = memory.add_schedule(
            Schedule::new(0, 1, "S1", at(2, 20, 0), at(2, 21, 0), ScheduleRecordingType::Once)
                .with_priority(5),
        );
        memory.add_schedule(
            Schedule::new(0, 2, "S2", at(2, 20, 30), at(2, 21, 30), ScheduleRecordingType::Once)
                .with_priority(8),
        );
        memory.with(|s| s.fail_conflict_writes = true);
        let (evaluator, mut events) = evaluator(&memory, EvaluatorConfig::default());

        let outcome = evaluator.evaluate_now_at(at(2, 12, 0)).await;
        assert_eq!(outcome.conflicts.len(), 1);
        assert!(!outcome.conflicts_persisted);
        assert!(memory.conflicts().is_empty());
        assert!(evaluator.conflicts_for_schedule(s1).await.is_empty());
        assert!(drain(&mut events).is_empty());

        memory.with(|s| s.fail_conflict_writes = false);
        let outcome = evaluator.evaluate_now_at(at(2, 12, 1)).await;
        assert!(outcome.conflicts_persisted);
        assert_eq!(evaluator.conflicts_for_schedule(s1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_degraded_pass_keeps_conflicts() {
        let memory = tuner();
        memory.add_schedule(Schedule::new(
            0,
            1,
            "S1",
            at(2, 20, 0),
            at(2, 21, 0),
            ScheduleRecordingType::Once,
        ));
        let previous = Conflict {
            id: 1,
            card_id: Some(1),
            channel_id: 1,
            schedule_id: 1,
            conflicting_schedule_id: Some(9),
            program_start_time: at(2, 20, 0),
        };
        memory.with(|s| {
            s.conflicts = vec![previous.clone()];
            s.fail_cards = true;
        });
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        let outcome = evaluator.evaluate_now_at(at(2, 12, 0)).await;
        assert!(outcome.degraded);
        assert!(!outcome.conflicts_persisted);
        assert_eq!(memory.conflicts(), vec![previous]);
        assert_eq!(memory.with(|s| s.conflict_writes), 0);

        // a degraded full check leaves the cache stale
        assert!(evaluator.tick_at(at(2, 12, 1)).await.is_some());
    }

    #[tokio::test]
    async fn test_unreadable_rules_keep_conflicts() {
        let memory = tuner();
        memory.add_schedule(Schedule::new(
            0,
            1,
            "S1",
            at(2, 20, 0),
            at(2, 21, 0),
            ScheduleRecordingType::Once,
        ));
        let previous = Conflict {
            id: 1,
            card_id: Some(1),
            channel_id: 1,
            schedule_id: -4,
            conflicting_schedule_id: Some(1),
            program_start_time: at(2, 20, 0),
        };
        memory.with(|s| {
            s.conflicts = vec![previous.clone()];
            s.fail_rules = true;
        });
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        let outcome = evaluator.evaluate_now_at(at(2, 12, 0)).await;
        assert!(outcome.degraded);
        assert!(!outcome.conflicts_persisted);
        assert_eq!(outcome.assigned.len(), 1);
        assert_eq!(memory.conflicts(), vec![previous]);
        assert_eq!(memory.with(|s| s.conflict_writes), 0);
    }

    #[tokio::test]
    async fn test_next_pre_check_follows_boundary() {
        let memory = tuner();
        memory.add_schedule(Schedule::new(
            0,
            1,
            "S1",
            at(2, 20, 0),
            at(2, 21, 0),
            ScheduleRecordingType::Once,
        ));
        let config = EvaluatorConfig {
            pre_check_interval_secs: 36_000,
            full_check_interval_secs: 86_400,
            ..Default::default()
        };
        let (evaluator, _events) = evaluator(&memory, config);

        evaluator.evaluate_now_at(at(2, 12, 0)).await;
        let state = evaluator.pass_guard.lock().await.clone();
        assert!(state.cache_up_to_date);
        assert_eq!(state.next_pre_check, Some(at(2, 19, 30)));
        assert_eq!(state.next_full_check, Some(at(3, 12, 0)));

        assert!(evaluator.tick_at(at(2, 19, 0)).await.is_none());
        let outcome = evaluator.tick_at(at(2, 19, 30)).await.unwrap();
        assert_eq!(outcome.mode, CheckMode::Pre);
    }

    #[tokio::test]
    async fn test_rule_edit_forces_full_check() {
        let memory = tuner();
        let backend = memory.backend();
        let registry = Arc::new(RuleRegistry::new(Arc::clone(&backend.rules)));
        let evaluator = PeriodicEvaluator::new(
            backend,
            Arc::clone(&registry),
            Notifier::default(),
            EvaluatorConfig::default(),
        );

        evaluator.evaluate_now_at(at(2, 12, 0)).await;
        assert!(evaluator.tick_at(at(2, 12, 1)).await.is_none());

        registry.create_rule(&ScheduleRule::new(0, "News")).await.unwrap();
        let outcome = evaluator.tick_at(at(2, 12, 1)).await.unwrap();
        assert_eq!(outcome.mode, CheckMode::Full);
    }

    #[tokio::test]
    async fn test_invalidate_forces_full_check() {
        let memory = tuner();
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        evaluator.evaluate_now_at(at(2, 12, 0)).await;
        assert!(evaluator.tick_at(at(2, 12, 1)).await.is_none());

        evaluator.invalidate();
        let outcome = evaluator.tick_at(at(2, 12, 1)).await.unwrap();
        assert_eq!(outcome.mode, CheckMode::Full);
    }

    #[tokio::test]
    async fn test_tick_skips_while_pass_running() {
        let memory = tuner();
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        let _guard = evaluator.pass_guard.lock().await;
        assert!(evaluator.tick_at(at(2, 12, 0)).await.is_none());
        assert_eq!(evaluator.completed_passes(), 0);
    }

    #[tokio::test]
    async fn test_evaluate_now_joins_running_pass() {
        let memory = tuner();
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());
        let evaluator = Arc::new(evaluator);

        let mut state = evaluator.pass_guard.lock().await;
        let waiter = tokio::spawn({
            let evaluator = Arc::clone(&evaluator);
            async move { evaluator.evaluate_now_at(at(2, 12, 5)).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let running = evaluator
            .run_pass(&mut state, CheckMode::Full, at(2, 12, 0))
            .await;
        drop(state);

        let joined = waiter.await.unwrap();
        assert!(Arc::ptr_eq(&running, &joined));
        assert_eq!(evaluator.completed_passes(), 1);
    }

    #[tokio::test]
    async fn test_programs_for_rule() {
        let memory = tuner();
        memory.add_program(Program::new(1, 2, at(2, 18, 0), at(2, 18, 30), "Evening News"));
        memory.add_program(Program::new(2, 1, at(2, 19, 0), at(2, 20, 0), "Film"));
        let rule_id = memory.add_rule(ScheduleRule::new(0, "News").with_target(
            RuleSearchTarget::Title,
            RuleSearchMatch::Include,
            "news",
        ));
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        let programs = evaluator.programs_for_rule(rule_id, at(2, 12, 0)).await.unwrap();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].id, 1);

        assert!(matches!(
            evaluator.programs_for_rule(42, at(2, 12, 0)).await,
            Err(EvaluatorError::UnknownRule(42))
        ));
    }

    #[tokio::test]
    async fn test_programs_for_schedule() {
        let memory = tuner();
        memory.add_program(Program::new(1, 1, at(2, 19, 0), at(2, 20, 0), "Film"));
        memory.add_program(Program::new(2, 1, at(3, 19, 0), at(3, 20, 0), "Film"));
        memory.add_program(Program::new(3, 2, at(2, 21, 0), at(2, 22, 0), "Film"));
        memory.add_program(Program::new(4, 1, at(2, 21, 0), at(2, 22, 0), "Quiz"));
        let every_time = memory.add_schedule(Schedule::new(
            0,
            1,
            "Film",
            at(2, 19, 0),
            at(2, 20, 0),
            ScheduleRecordingType::EveryTimeOnThisChannel,
        ));
        memory.with(|s| {
            s.canceled.push(CanceledSchedule {
                schedule_id: every_time,
                start: at(3, 19, 0),
            })
        });
        let once = memory.add_schedule(Schedule::new(
            0,
            1,
            "Quiz",
            at(2, 21, 0),
            at(2, 22, 0),
            ScheduleRecordingType::Once,
        ));
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        let programs = evaluator.programs_for_schedule(every_time, at(2, 12, 0)).await.unwrap();
        assert_eq!(programs.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);

        let programs = evaluator.programs_for_schedule(once, at(2, 12, 0)).await.unwrap();
        assert_eq!(programs.iter().map(|p| p.id).collect::<Vec<_>>(), vec![4]);

        assert!(matches!(
            evaluator.programs_for_schedule(99, at(2, 12, 0)).await,
            Err(EvaluatorError::UnknownSchedule(99))
        ));
    }

    #[tokio::test]
    async fn test_conflicts_for_rule() {
        let memory = tuner();
        let mut owned = Schedule::new(
            0,
            1,
            "Drama",
            at(2, 20, 0),
            at(2, 21, 0),
            ScheduleRecordingType::Once,
        );
        owned.rule_id = Some(5);
        let owned = memory.add_schedule(owned);
        let conflict = |id, schedule_id, conflicting| Conflict {
            id,
            card_id: Some(1),
            channel_id: 1,
            schedule_id,
            conflicting_schedule_id: Some(conflicting),
            program_start_time: at(2, 20, 0),
        };
        memory.with(|s| {
            s.conflicts = vec![
                conflict(1, 40, owned),
                conflict(2, -5, 41),
                conflict(3, 42, 43),
                conflict(4, -6, 44),
            ]
        });
        let (evaluator, _events) = evaluator(&memory, EvaluatorConfig::default());

        let ids: Vec<i64> = evaluator
            .conflicts_for_rule(5)
            .await
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(evaluator.conflicts_for_rule(7).await.is_empty());
    }
}

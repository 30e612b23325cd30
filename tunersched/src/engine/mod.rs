//! Scheduling engine.
//!
//! One evaluation pass runs these steps over a fresh [`ScheduleCache`]:
//! - [`expander`]: persisted schedules into occurrences
//! - [`rules`]: schedule rules matched against the listing
//! - [`moved`]: nominal times reconciled with the listing
//! - [`dedup`]: known episodes and recordings suppressed
//! - [`allocator`]: cards assigned, conflicts recorded
//!
//! Persisting the results is left to the evaluator in
//! [`crate::scheduler`].

pub mod allocator;
pub mod cache;
pub mod dedup;
pub mod expander;
pub mod matching;
pub mod moved;
pub mod occurrence;
pub mod rules;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use log::debug;

use tunersched_protocol::{ProgramId, RuleId, Schedule, ScheduleId, ScheduleRule};

pub use allocator::Allocation;
pub use cache::{CardAssignment, ScheduleCache};
pub use dedup::{EpisodeDeduplicator, Registration, SuppressReason, Verdict};
pub use moved::MovedProgram;
pub use occurrence::{EpisodeInfo, Occurrence, OccurrenceSource, OccurrenceState};

use rules::CompiledRule;

/// Knobs of one pass.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub detect_moved_programs: bool,
    /// How far from the nominal start a moved program is searched.
    pub moved_window: Duration,
    pub auto_resolve_conflicts: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            detect_moved_programs: false,
            moved_window: Duration::minutes(30),
            auto_resolve_conflicts: true,
        }
    }
}

/// Add rule occurrences to the schedule occurrences and restore the order.
///
/// A rule occurrence whose program a schedule already records is dropped.
pub fn merge(occurrences: &mut Vec<Occurrence>, from_rules: Vec<Occurrence>) {
    let held: HashSet<ProgramId> = occurrences.iter().filter_map(|o| o.program_id()).collect();
    occurrences.extend(
        from_rules
            .into_iter()
            .filter(|o| o.program_id().map_or(true, |id| !held.contains(&id))),
    );
    occurrence::sort_occurrences(occurrences);
}

/// Give occurrences of schedules materialized from a rule the rule's episode
/// handling, so they register with the deduplicator like the rule's own
/// occurrences do.
pub fn inherit_rule_settings(
    occurrences: &mut [Occurrence],
    schedules: &[Schedule],
    rules: &[ScheduleRule],
) {
    let owner: HashMap<ScheduleId, RuleId> = schedules
        .iter()
        .filter_map(|s| s.rule_id.map(|rule_id| (s.id, rule_id)))
        .collect();
    if owner.is_empty() {
        return;
    }

    let compiled: HashMap<RuleId, CompiledRule> = rules
        .iter()
        .filter(|r| owner.values().any(|id| *id == r.id))
        .map(|r| (r.id, CompiledRule::new(r.clone())))
        .collect();

    for occurrence in occurrences.iter_mut() {
        let OccurrenceSource::Schedule(schedule_id) = occurrence.source else {
            continue;
        };
        let Some(rule) = owner.get(&schedule_id).and_then(|id| compiled.get(id)) else {
            continue;
        };

        occurrence.is_series |= rule.rule.is_series;
        if occurrence.episode_management.is_none() {
            occurrence.episode_management = rule.rule.episode_management;
        }
        if let Some(program) = &occurrence.program {
            occurrence.episode = rule.episode_info(program);
        }
    }
}

/// Run expansion, rule evaluation, moved-program resolution, deduplication
/// and allocation over `cache`.
pub async fn run(cache: &mut ScheduleCache, rules: &[ScheduleRule], settings: &EngineSettings) {
    let mut occurrences = expander::expand(cache).await;
    inherit_rule_settings(&mut occurrences, &cache.schedules, rules);
    let from_rules = rules::evaluate(cache, rules).await;
    merge(&mut occurrences, from_rules);

    debug!("Engine: {} candidate occurrence(s)", occurrences.len());

    let lookup = Arc::clone(&cache.backend().recordings);
    for mut occurrence in occurrences {
        if settings.detect_moved_programs {
            if let Some(moved) =
                moved::resolve(cache, &mut occurrence, settings.moved_window).await
            {
                cache.moved.push(moved);
            }
        }

        match cache.dedup.check(&occurrence, lookup.as_ref()).await {
            Verdict::Suppress(reason) => {
                debug!(
                    "Engine: {:?} at {} suppressed ({:?})",
                    occurrence.name, occurrence.start, reason
                );
                cache.suppressed.push(occurrence);
            }
            Verdict::Keep(registration) => {
                allocator::allocate(
                    cache,
                    occurrence,
                    registration,
                    settings.auto_resolve_conflicts,
                )
                .await;
            }
        }
    }
}

impl ScheduleCache {
    /// Final state of every occurrence the pass handled.
    pub fn final_states(&self) -> Vec<(ScheduleId, NaiveDateTime, OccurrenceState)> {
        let key = |o: &Occurrence| (o.schedule_id(), o.start);
        let mut states = Vec::new();

        states.extend(
            self.assignments
                .iter()
                .map(|a| (key(&a.occurrence), OccurrenceState::Assigned(a.card_id))),
        );
        states.extend(self.suppressed.iter().map(|o| (key(o), OccurrenceState::Deduplicated)));
        states.extend(self.unassigned.iter().map(|o| (key(o), OccurrenceState::Conflicted)));
        states.extend(self.replaced.iter().map(|o| (key(o), OccurrenceState::Replaced)));
        states.extend(self.covered.iter().map(|o| (key(o), OccurrenceState::Covered)));

        states.sort_by_key(|((id, start), _)| (*start, *id));
        states
            .into_iter()
            .map(|((id, start), state)| (id, start, state))
            .collect()
    }
}

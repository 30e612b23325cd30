//! Per-pass working set.
//!
//! A [`ScheduleCache`] is built at the start of every evaluation pass and
//! dropped at its end. Collaborator lookups made during the pass (program
//! lists, tuning details) are memoized here and never outlive it.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDateTime};
use log::{debug, warn};

use tunersched_protocol::{
    CanceledSchedule, Card, CardId, Channel, ChannelGroup, ChannelId, Conflict, Program,
    Schedule, ScheduleId, TuningDetail,
};

use super::dedup::{EpisodeDeduplicator, Registration};
use super::moved::MovedProgram;
use super::occurrence::{ranges_overlap, Occurrence};
use crate::provider::Backend;

/// Listings are fetched this far beyond the pass window on both sides.
const LISTING_MARGIN_HOURS: i64 = 12;

/// One occurrence bound to a card.
#[derive(Debug, Clone)]
pub struct CardAssignment {
    pub card_id: CardId,
    pub tuning: TuningDetail,
    pub occurrence: Occurrence,
    pub registration: Registration,
}

impl CardAssignment {
    pub fn overlaps(&self, other: &Occurrence) -> bool {
        ranges_overlap(self.occurrence.padded_range(), other.padded_range())
    }
}

/// Mutable state of one evaluation pass.
#[derive(Debug)]
pub struct ScheduleCache {
    backend: Backend,
    pub now: NaiveDateTime,
    pub window_end: NaiveDateTime,
    /// Enabled cards, descending priority, stable on ties.
    pub cards: Vec<Card>,
    pub channels: Vec<Channel>,
    pub groups: Vec<ChannelGroup>,
    pub schedules: Vec<Schedule>,
    canceled: HashSet<CanceledSchedule>,

    pub dedup: EpisodeDeduplicator,
    pub assignments: Vec<CardAssignment>,
    pub conflicts: Vec<Conflict>,
    /// Occurrences stopped by the deduplicator.
    pub suppressed: Vec<Occurrence>,
    /// Occurrences left without a card.
    pub unassigned: Vec<Occurrence>,
    /// Occurrences evicted by preemption.
    pub replaced: Vec<Occurrence>,
    /// Rule occurrences whose program another rule already records.
    pub covered: Vec<Occurrence>,
    pub moved: Vec<MovedProgram>,
    /// Set when cards, channels, schedules or rules could not be read.
    pub degraded: bool,

    programs: HashMap<ChannelId, Vec<Program>>,
    programs_by_title: HashMap<String, Vec<Program>>,
    tuning: HashMap<(CardId, ChannelId), Option<TuningDetail>>,
}

impl ScheduleCache {
    /// Build the working set for the window `[now, window_end)`.
    ///
    /// Every collaborator failure is logged and degrades to an empty result.
    pub async fn load(
        backend: Backend,
        now: NaiveDateTime,
        window_end: NaiveDateTime,
        mut dedup: EpisodeDeduplicator,
    ) -> Self {
        let mut degraded = false;

        let mut cards = match backend.cards.cards().await {
            Ok(cards) => cards,
            Err(e) => {
                warn!("ScheduleCache: failed to enumerate cards: {}", e);
                degraded = true;
                Vec::new()
            }
        };
        cards.retain(|c| c.enabled);
        cards.sort_by(|a, b| b.priority.cmp(&a.priority));

        let channels = match backend.channels.channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!("ScheduleCache: failed to enumerate channels: {}", e);
                degraded = true;
                Vec::new()
            }
        };

        let groups = backend.channels.channel_groups().await.unwrap_or_else(|e| {
            warn!("ScheduleCache: failed to enumerate channel groups: {}", e);
            Vec::new()
        });

        let schedules = match backend.schedules.schedules().await {
            Ok(schedules) => schedules,
            Err(e) => {
                warn!("ScheduleCache: failed to enumerate schedules: {}", e);
                degraded = true;
                Vec::new()
            }
        };

        let canceled = backend
            .schedules
            .canceled_schedules()
            .await
            .unwrap_or_else(|e| {
                warn!("ScheduleCache: failed to read canceled schedules: {}", e);
                Vec::new()
            })
            .into_iter()
            .collect();

        match backend.recordings.known_series().await {
            Ok(series) => dedup.seed(&series),
            Err(e) => warn!("ScheduleCache: failed to read known series: {}", e),
        }

        debug!(
            "ScheduleCache: {} cards, {} channels, {} schedules for {} .. {}",
            cards.len(),
            channels.len(),
            schedules.len(),
            now,
            window_end
        );

        Self {
            backend,
            now,
            window_end,
            cards,
            channels,
            groups,
            schedules,
            canceled,
            dedup,
            assignments: Vec::new(),
            conflicts: Vec::new(),
            suppressed: Vec::new(),
            unassigned: Vec::new(),
            replaced: Vec::new(),
            covered: Vec::new(),
            moved: Vec::new(),
            degraded,
            programs: HashMap::new(),
            programs_by_title: HashMap::new(),
            tuning: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn is_canceled(&self, schedule_id: ScheduleId, start: NaiveDateTime) -> bool {
        self.canceled.contains(&CanceledSchedule { schedule_id, start })
    }

    fn listing_range(&self) -> (NaiveDateTime, NaiveDateTime) {
        let margin = Duration::hours(LISTING_MARGIN_HOURS);
        (self.now - margin, self.window_end + margin)
    }

    /// Programs of one channel around the pass window, fetched once per pass.
    pub async fn programs(&mut self, channel_id: ChannelId) -> Vec<Program> {
        if let Some(programs) = self.programs.get(&channel_id) {
            return programs.clone();
        }

        let (from, to) = self.listing_range();
        let programs = match self
            .backend
            .programs
            .programs_for_channel(channel_id, from, to)
            .await
        {
            Ok(programs) => programs,
            Err(e) => {
                warn!("ScheduleCache: failed to fetch programs of channel {}: {}", channel_id, e);
                Vec::new()
            }
        };
        self.programs.insert(channel_id, programs.clone());
        programs
    }

    /// Programs on any channel titled `title`, fetched once per pass.
    pub async fn programs_by_title(&mut self, title: &str) -> Vec<Program> {
        let key = title.trim().to_lowercase();
        if let Some(programs) = self.programs_by_title.get(&key) {
            return programs.clone();
        }

        let (from, to) = self.listing_range();
        let programs = match self.backend.programs.programs_by_title(title, from, to).await {
            Ok(programs) => programs,
            Err(e) => {
                warn!("ScheduleCache: failed to fetch programs titled {:?}: {}", title, e);
                Vec::new()
            }
        };
        self.programs_by_title.insert(key, programs.clone());
        programs
    }

    /// How `card_id` receives `channel_id`, resolved once per pass.
    pub async fn tuning_detail(
        &mut self,
        card_id: CardId,
        channel_id: ChannelId,
    ) -> Option<TuningDetail> {
        if let Some(detail) = self.tuning.get(&(card_id, channel_id)) {
            return detail.clone();
        }

        let detail = match self.backend.cards.tuning_detail(card_id, channel_id).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(
                    "ScheduleCache: failed to resolve tuning of channel {} on card {}: {}",
                    channel_id, card_id, e
                );
                None
            }
        };
        self.tuning.insert((card_id, channel_id), detail.clone());
        detail
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|c| c.id).collect()
    }

    pub fn assignments_on(&self, card_id: CardId) -> impl Iterator<Item = &CardAssignment> {
        self.assignments.iter().filter(move |a| a.card_id == card_id)
    }

    pub fn assignment_for(&self, schedule_id: ScheduleId, start: NaiveDateTime) -> Option<&CardAssignment> {
        self.assignments
            .iter()
            .find(|a| a.occurrence.schedule_id() == schedule_id && a.occurrence.start == start)
    }

    /// Record a conflict, numbering it within the pass.
    pub fn push_conflict(&mut self, mut conflict: Conflict) {
        conflict.id = self.conflicts.len() as i64 + 1;
        self.conflicts.push(conflict);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{at, dvbt, MemoryBackend};

    #[tokio::test]
    async fn test_cards_sorted_and_filtered() {
        let memory = MemoryBackend::new();
        memory.add_card(Card::new(1, "low", 1));
        memory.add_card(Card::new(2, "high-a", 5));
        memory.add_card(Card::new(3, "high-b", 5));
        let mut disabled = Card::new(4, "off", 9);
        disabled.enabled = false;
        memory.add_card(disabled);

        let cache = ScheduleCache::load(
            memory.backend(),
            at(2, 0, 0),
            at(3, 0, 0),
            EpisodeDeduplicator::default(),
        )
        .await;

        let order: Vec<CardId> = cache.cards.iter().map(|c| c.id).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert!(!cache.degraded);
    }

    #[tokio::test]
    async fn test_lookups_are_memoized() {
        let memory = MemoryBackend::new();
        memory.add_tuning(1, dvbt(7, 506, false));
        memory.add_program(Program::new(1, 7, at(2, 20, 0), at(2, 21, 0), "Film"));

        let mut cache = ScheduleCache::load(
            memory.backend(),
            at(2, 0, 0),
            at(3, 0, 0),
            EpisodeDeduplicator::default(),
        )
        .await;

        for _ in 0..3 {
            assert_eq!(cache.programs(7).await.len(), 1);
            assert!(cache.tuning_detail(1, 7).await.is_some());
            assert!(cache.tuning_detail(2, 7).await.is_none());
        }

        memory.with(|s| {
            assert_eq!(s.program_calls, 1);
            assert_eq!(s.tuning_calls, 2);
        });
    }

    #[tokio::test]
    async fn test_failures_degrade_to_empty() {
        let memory = MemoryBackend::new();
        memory.with(|s| {
            s.fail_cards = true;
            s.fail_programs_for.insert(7);
        });
        memory.add_program(Program::new(1, 7, at(2, 20, 0), at(2, 21, 0), "Film"));

        let mut cache = ScheduleCache::load(
            memory.backend(),
            at(2, 0, 0),
            at(3, 0, 0),
            EpisodeDeduplicator::default(),
        )
        .await;

        assert!(cache.degraded);
        assert!(cache.cards.is_empty());
        assert!(cache.programs(7).await.is_empty());
    }
}

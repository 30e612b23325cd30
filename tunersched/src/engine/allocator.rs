//! Card allocation and conflict detection.
//!
//! Occurrences are offered one at a time in start order. Cards are scanned
//! in descending priority (stable on ties); the first card able to take the
//! occurrence wins. Only when no card is free is preemption considered:
//! a card whose blockers all have a strictly lower priority becomes a
//! replacement candidate, and the candidate needing the fewest evictions
//! is used.

use log::{debug, info};

use tunersched_protocol::{Card, CardId, Conflict, ScheduleId, TuningDetail};

use super::cache::{CardAssignment, ScheduleCache};
use super::dedup::Registration;
use super::occurrence::Occurrence;

/// Outcome of offering one occurrence to the cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    Assigned {
        card_id: CardId,
    },
    /// Bound after evicting lower priority assignments.
    Preempted {
        card_id: CardId,
        evicted: Vec<ScheduleId>,
    },
    /// Another rule occurrence already records the same program.
    Covered {
        by: ScheduleId,
    },
    /// Left without a card; a conflict was recorded.
    Conflicted {
        card_id: Option<CardId>,
    },
}

struct Candidate {
    card_id: CardId,
    tuning: TuningDetail,
    blockers: Vec<usize>,
}

/// Whether `tuning` can be received alongside the overlapping `blockers` on `card`.
fn can_share(card: &Card, tuning: &TuningDetail, blockers: &[&CardAssignment]) -> bool {
    if blockers.is_empty() {
        return true;
    }
    if !card.supports_sub_channels {
        return false;
    }
    if !blockers
        .iter()
        .all(|a| a.tuning.transmitter.same_transmitter(&tuning.transmitter))
    {
        return false;
    }
    if tuning.is_encrypted {
        let decrypting = blockers.iter().filter(|a| a.tuning.is_encrypted).count() + 1;
        return decrypting <= card.decrypt_limit as usize;
    }
    true
}

fn bind(
    cache: &mut ScheduleCache,
    card_id: CardId,
    tuning: TuningDetail,
    occurrence: Occurrence,
    registration: Registration,
) {
    cache.assignments.push(CardAssignment {
        card_id,
        tuning,
        occurrence,
        registration,
    });
}

/// Offer `occurrence` to the cards of the pass.
///
/// `registration` is what the deduplicator recorded for it; it is rolled
/// back whenever the occurrence ends without a card. Never fails: the
/// worst outcome is a recorded conflict.
pub async fn allocate(
    cache: &mut ScheduleCache,
    occurrence: Occurrence,
    registration: Registration,
    auto_resolve: bool,
) -> Allocation {
    let cards = cache.cards.clone();
    let mut candidates: Vec<Candidate> = Vec::new();
    // (priority, card, schedule) of the strongest blocker seen
    let mut strongest: Option<(i32, CardId, ScheduleId)> = None;

    for card in &cards {
        let Some(tuning) = cache.tuning_detail(card.id, occurrence.channel_id).await else {
            continue;
        };
        if tuning.is_encrypted && card.decrypt_limit == 0 {
            continue;
        }

        let blockers: Vec<usize> = cache
            .assignments
            .iter()
            .enumerate()
            .filter(|(_, a)| a.card_id == card.id && a.overlaps(&occurrence))
            .map(|(i, _)| i)
            .collect();
        let blocking: Vec<&CardAssignment> =
            blockers.iter().map(|&i| &cache.assignments[i]).collect();

        if can_share(card, &tuning, &blocking) {
            debug!(
                "CardAllocator: {:?} at {} -> card {}",
                occurrence.name, occurrence.start, card.id
            );
            bind(cache, card.id, tuning, occurrence, registration);
            return Allocation::Assigned { card_id: card.id };
        }

        if occurrence.source.is_rule() && occurrence.program_id().is_some() {
            let covering = blocking.iter().find(|a| {
                a.occurrence.source.is_rule() && a.occurrence.program_id() == occurrence.program_id()
            });
            if let Some(covering) = covering {
                let by = covering.occurrence.schedule_id();
                debug!(
                    "CardAllocator: {:?} at {} already covered by {}",
                    occurrence.name, occurrence.start, by
                );
                cache.dedup.rollback(&registration);
                cache.covered.push(occurrence);
                return Allocation::Covered { by };
            }
        }

        let mut highest = i32::MIN;
        for blocker in &blocking {
            let priority = blocker.occurrence.priority;
            highest = highest.max(priority);
            if strongest.map_or(true, |(p, _, _)| priority > p) {
                strongest = Some((priority, card.id, blocker.occurrence.schedule_id()));
            }
        }

        if occurrence.priority > highest {
            candidates.push(Candidate {
                card_id: card.id,
                tuning,
                blockers,
            });
        }
    }

    if auto_resolve {
        if let Some(best) = candidates.into_iter().min_by_key(|c| c.blockers.len()) {
            return preempt(cache, best, occurrence, registration);
        }
    }

    let conflict = Conflict {
        id: 0,
        card_id: strongest.map(|(_, card, _)| card),
        channel_id: occurrence.channel_id,
        schedule_id: occurrence.schedule_id(),
        conflicting_schedule_id: strongest.map(|(_, _, schedule)| schedule),
        program_start_time: occurrence.effective_range().0,
    };
    info!(
        "CardAllocator: no card for {:?} at {} (blocked by {:?})",
        occurrence.name, conflict.program_start_time, conflict.conflicting_schedule_id
    );
    cache.push_conflict(conflict);
    cache.dedup.rollback(&registration);
    cache.unassigned.push(occurrence);

    Allocation::Conflicted {
        card_id: strongest.map(|(_, card, _)| card),
    }
}

fn preempt(
    cache: &mut ScheduleCache,
    candidate: Candidate,
    occurrence: Occurrence,
    registration: Registration,
) -> Allocation {
    let Candidate {
        card_id,
        tuning,
        mut blockers,
    } = candidate;
    blockers.sort_unstable_by(|a, b| b.cmp(a));

    let mut evicted = Vec::with_capacity(blockers.len());
    for index in blockers {
        let assignment = cache.assignments.remove(index);
        cache.dedup.rollback(&assignment.registration);

        let schedule_id = assignment.occurrence.schedule_id();
        info!(
            "CardAllocator: {:?} at {} replaced on card {} by {:?}",
            assignment.occurrence.name, assignment.occurrence.start, card_id, occurrence.name
        );
        cache.push_conflict(Conflict {
            id: 0,
            card_id: Some(card_id),
            channel_id: assignment.occurrence.channel_id,
            schedule_id,
            conflicting_schedule_id: Some(occurrence.schedule_id()),
            program_start_time: assignment.occurrence.effective_range().0,
        });
        cache.replaced.push(assignment.occurrence);
        evicted.push(schedule_id);
    }
    evicted.reverse();

    bind(cache, card_id, tuning, occurrence, registration);
    Allocation::Preempted { card_id, evicted }
}

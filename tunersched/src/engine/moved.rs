//! Reconciliation of nominal schedule times with the program listing.

use chrono::{Duration, NaiveDateTime};
use log::debug;

use tunersched_protocol::{titles_equal, ChannelId, Program, ScheduleId};

use super::cache::ScheduleCache;
use super::matching::program_fits;
use super::occurrence::Occurrence;

/// A schedule whose listing entry airs at a different time than planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedProgram {
    pub schedule_id: ScheduleId,
    pub channel_id: ChannelId,
    pub name: String,
    pub nominal_start: NaiveDateTime,
    pub nominal_end: NaiveDateTime,
    pub program: Program,
}

fn is_candidate(occurrence: &Occurrence, program: &Program, window: Duration) -> bool {
    let distance = (program.start - occurrence.start).num_seconds().abs();
    if distance > window.num_seconds() {
        return false;
    }

    let fits = program_fits(
        occurrence.recording_type,
        &occurrence.name,
        occurrence.channel_id,
        occurrence.start,
        occurrence.end,
        program,
    );
    if occurrence.recording_type.is_time_based() {
        fits || titles_equal(&program.title, &occurrence.name)
    } else {
        fits
    }
}

/// Bind `occurrence` to the program it really records.
///
/// Candidates are programs on the occurrence's channel starting within
/// `window` of the nominal start. A single candidate wins; among several the
/// closest one with an equal title wins; otherwise the nominal time stands.
/// Returns the move when the resolved time differs from the nominal one.
pub async fn resolve(
    cache: &mut ScheduleCache,
    occurrence: &mut Occurrence,
    window: Duration,
) -> Option<MovedProgram> {
    if occurrence.source.is_rule() || occurrence.is_manual() {
        return None;
    }

    let programs = cache.programs(occurrence.channel_id).await;
    let candidates: Vec<&Program> = programs
        .iter()
        .filter(|p| is_candidate(occurrence, p, window))
        .collect();

    let resolved = match candidates.as_slice() {
        [] => return None,
        [only] => (*only).clone(),
        several => {
            let nominal = occurrence.start;
            let titled = several
                .iter()
                .filter(|p| titles_equal(&p.title, &occurrence.name))
                .min_by_key(|p| (p.start - nominal).num_seconds().abs());
            match titled {
                Some(p) => (*p).clone(),
                None => {
                    debug!(
                        "MovedProgramResolver: {} candidates for {:?} at {}, keeping nominal time",
                        several.len(),
                        occurrence.name,
                        nominal
                    );
                    return None;
                }
            }
        }
    };

    occurrence.actual = Some((resolved.start, resolved.end));
    occurrence.attach_program(resolved.clone());

    if !occurrence.is_moved() {
        return None;
    }

    debug!(
        "MovedProgramResolver: {:?} moved from {} to {}",
        occurrence.name, occurrence.start, resolved.start
    );
    Some(MovedProgram {
        schedule_id: occurrence.schedule_id(),
        channel_id: occurrence.channel_id,
        name: occurrence.name.clone(),
        nominal_start: occurrence.start,
        nominal_end: occurrence.end,
        program: resolved,
    })
}

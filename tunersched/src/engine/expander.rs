//! Expansion of persisted schedules into occurrences.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

use tunersched_protocol::{Schedule, ScheduleRecordingType};

use super::cache::ScheduleCache;
use super::matching::{best_program, program_fits};
use super::occurrence::{sort_occurrences, Occurrence};

fn day_allowed(recording_type: ScheduleRecordingType, original: Weekday, date: NaiveDate) -> bool {
    let day = date.weekday();
    match recording_type {
        ScheduleRecordingType::Weekly => day == original,
        ScheduleRecordingType::Weekends => matches!(day, Weekday::Sat | Weekday::Sun),
        ScheduleRecordingType::WorkingDays => !matches!(day, Weekday::Sat | Weekday::Sun),
        _ => true,
    }
}

/// Nominal ranges of a time-based schedule that overlap `[now, window_end)`.
///
/// Recurring types clone the time of day onto every allowed date from the
/// schedule's own start date on. Overnight schedules end on the following
/// day; their clone from the day before `now` is included while it airs.
/// Title-based types yield nothing here.
pub fn occurrence_times(
    schedule: &Schedule,
    now: NaiveDateTime,
    window_end: NaiveDateTime,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let in_window = |start: NaiveDateTime, end: NaiveDateTime| end > now && start < window_end;

    match schedule.recording_type {
        ScheduleRecordingType::Once => {
            if in_window(schedule.start, schedule.end) {
                vec![(schedule.start, schedule.end)]
            } else {
                Vec::new()
            }
        }
        ScheduleRecordingType::Daily
        | ScheduleRecordingType::Weekly
        | ScheduleRecordingType::Weekends
        | ScheduleRecordingType::WorkingDays => {
            let overnight = schedule.is_overnight();
            let start_time = schedule.start.time();
            let end_time = schedule.end.time();
            let original_day = schedule.start.weekday();

            let mut date = now.date();
            if overnight {
                date = date - Duration::days(1);
            }
            date = date.max(schedule.start.date());

            let mut times = Vec::new();
            while date.and_time(start_time) < window_end {
                if day_allowed(schedule.recording_type, original_day, date) {
                    let start = date.and_time(start_time);
                    let mut end = date.and_time(end_time);
                    if overnight {
                        end += Duration::days(1);
                    }
                    if in_window(start, end) {
                        times.push((start, end));
                    }
                }
                date = date + Duration::days(1);
            }
            times
        }
        _ => Vec::new(),
    }
}

/// Expand every persisted schedule of the pass into occurrences.
///
/// Time-based occurrences are bound to the listing entry they record;
/// title-based ones come straight from the listings and carry the
/// program's own times. Canceled occurrences are dropped.
pub async fn expand(cache: &mut ScheduleCache) -> Vec<Occurrence> {
    let (now, window_end) = (cache.now, cache.window_end);
    let schedules = cache.schedules.clone();
    let mut occurrences = Vec::new();

    for schedule in &schedules {
        if schedule.recording_type.is_time_based() {
            let programs = if schedule.is_manual() {
                Vec::new()
            } else {
                cache.programs(schedule.channel_id).await
            };

            for (start, end) in occurrence_times(schedule, now, window_end) {
                if cache.is_canceled(schedule.id, start) {
                    continue;
                }
                let mut occurrence = Occurrence::from_schedule(schedule, start, end);
                if let Some(program) = best_program(&programs, &schedule.name, start, end) {
                    occurrence.attach_program(program.clone());
                }
                occurrences.push(occurrence);
            }
            continue;
        }

        let programs = match schedule.recording_type {
            ScheduleRecordingType::EveryTimeOnEveryChannel => {
                cache.programs_by_title(&schedule.name).await
            }
            _ => cache.programs(schedule.channel_id).await,
        };

        for program in programs {
            if program.end <= now || program.start >= window_end {
                continue;
            }
            if !program_fits(
                schedule.recording_type,
                &schedule.name,
                schedule.channel_id,
                schedule.start,
                schedule.end,
                &program,
            ) {
                continue;
            }
            if cache.is_canceled(schedule.id, program.start) {
                continue;
            }

            let mut occurrence = Occurrence::from_schedule(schedule, program.start, program.end);
            occurrence.channel_id = program.channel_id;
            occurrence.attach_program(program);
            occurrences.push(occurrence);
        }
    }

    sort_occurrences(&mut occurrences);
    occurrences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dedup::EpisodeDeduplicator;
    use crate::provider::memory::{at, MemoryBackend};
    use tunersched_protocol::{CanceledSchedule, Channel, Program};

    fn daily(recording_type: ScheduleRecordingType) -> Schedule {
        Schedule::new(1, 1, "Morning", at(1, 7, 0), at(1, 7, 30), recording_type)
    }

    #[test]
    fn test_daily_lookahead() {
        let times = occurrence_times(
            &daily(ScheduleRecordingType::Daily),
            at(2, 0, 0),
            at(2, 0, 0) + Duration::days(3),
        );

        let dates: Vec<u32> = times.iter().map(|(s, _)| s.day()).collect();
        assert_eq!(dates, vec![2, 3, 4]);
        assert!(times.iter().all(|(s, e)| *e - *s == Duration::minutes(30)));
    }

    #[test]
    fn test_day_restricted_types() {
        // 2024-01-01 is a Monday
        let now = at(1, 0, 0);
        let end = now + Duration::days(14);

        let weekly = occurrence_times(&daily(ScheduleRecordingType::Weekly), now, end);
        assert_eq!(weekly.len(), 2);
        assert!(weekly.iter().all(|(s, _)| s.weekday() == Weekday::Mon));

        let weekends = occurrence_times(&daily(ScheduleRecordingType::Weekends), now, end);
        assert_eq!(weekends.len(), 4);

        let working = occurrence_times(&daily(ScheduleRecordingType::WorkingDays), now, end);
        assert_eq!(working.len(), 10);
    }

    #[test]
    fn test_overnight_end_rolls_forward() {
        let schedule = Schedule::new(
            1,
            1,
            "Late",
            at(1, 23, 30),
            at(2, 0, 30),
            ScheduleRecordingType::Daily,
        );

        let times = occurrence_times(&schedule, at(3, 0, 10), at(4, 0, 0));
        assert_eq!(
            times,
            vec![(at(2, 23, 30), at(3, 0, 30)), (at(3, 23, 30), at(4, 0, 30))]
        );
    }

    #[test]
    fn test_once_outside_window() {
        let once = Schedule::new(1, 1, "Film", at(5, 20, 0), at(5, 22, 0), ScheduleRecordingType::Once);
        assert!(occurrence_times(&once, at(1, 0, 0), at(4, 0, 0)).is_empty());
        assert!(occurrence_times(&once, at(6, 0, 0), at(8, 0, 0)).is_empty());
        assert_eq!(occurrence_times(&once, at(5, 21, 0), at(6, 0, 0)).len(), 1);
    }

    #[tokio::test]
    async fn test_title_based_and_canceled() {
        let memory = MemoryBackend::new();
        memory.add_channel(Channel::new(1, "One"));
        memory.add_channel(Channel::new(2, "Two"));
        memory.add_program(Program::new(1, 1, at(2, 18, 0), at(2, 18, 30), "Quiz"));
        memory.add_program(Program::new(2, 2, at(2, 19, 0), at(2, 19, 30), "quiz"));
        memory.add_program(Program::new(3, 1, at(3, 18, 0), at(3, 18, 30), "Quiz"));
        memory.add_program(Program::new(4, 1, at(3, 19, 0), at(3, 19, 30), "News"));

        let this_channel = memory.add_schedule(Schedule::new(
            0,
            1,
            "Quiz",
            at(1, 18, 0),
            at(1, 18, 30),
            ScheduleRecordingType::EveryTimeOnThisChannel,
        ));
        memory.add_schedule(Schedule::new(
            0,
            1,
            "Quiz",
            at(1, 18, 0),
            at(1, 18, 30),
            ScheduleRecordingType::EveryTimeOnEveryChannel,
        ));
        memory.with(|s| {
            s.canceled.push(CanceledSchedule {
                schedule_id: this_channel,
                start: at(3, 18, 0),
            })
        });

        let mut cache = ScheduleCache::load(
            memory.backend(),
            at(2, 0, 0),
            at(5, 0, 0),
            EpisodeDeduplicator::default(),
        )
        .await;

        let first = expand(&mut cache).await;
        let summary: Vec<(i64, i64, Option<i64>)> = first
            .iter()
            .map(|o| (o.schedule_id(), o.channel_id, o.program_id()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (this_channel, 1, Some(1)),
                (2, 1, Some(1)),
                (2, 2, Some(2)),
                (2, 1, Some(3)),
            ]
        );
        assert_eq!(first[2].start, at(2, 19, 0));

        let second = expand(&mut cache).await;
        assert_eq!(first, second);
    }
}

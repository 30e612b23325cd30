//! Matching of schedules and rule targets against program listings.

use std::cmp::Reverse;

use chrono::NaiveDateTime;
use log::warn;
use regex::{Regex, RegexBuilder};

use tunersched_protocol::{
    titles_equal, weekday_of, ChannelId, Program, RuleSearchMatch, ScheduleRecordingType,
};

/// Compile a case-insensitive pattern. Invalid patterns yield `None`.
pub fn compile_pattern(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Ignoring invalid pattern {:?}: {}", pattern, e);
            None
        }
    }
}

/// Compare one text field. `regex` is the precompiled form of `needle` for
/// [`RuleSearchMatch::Regex`]; a missing regex never matches.
pub fn text_matches(
    mode: RuleSearchMatch,
    haystack: &str,
    needle: &str,
    regex: Option<&Regex>,
) -> bool {
    match mode {
        RuleSearchMatch::Exact => titles_equal(haystack, needle),
        RuleSearchMatch::Include => haystack
            .to_lowercase()
            .contains(&needle.trim().to_lowercase()),
        RuleSearchMatch::Exclude => !haystack
            .to_lowercase()
            .contains(&needle.trim().to_lowercase()),
        RuleSearchMatch::Regex => regex.map_or(false, |r| r.is_match(haystack)),
    }
}

/// Compare a star rating against a numeric target.
///
/// Include means "at least", Exclude "below". Non-numeric targets never match.
pub fn rating_matches(mode: RuleSearchMatch, rating: i32, target: &str, regex: Option<&Regex>) -> bool {
    if mode == RuleSearchMatch::Regex {
        return regex.map_or(false, |r| r.is_match(&rating.to_string()));
    }

    let Ok(wanted) = target.trim().parse::<i32>() else {
        return false;
    };

    match mode {
        RuleSearchMatch::Exact => rating == wanted,
        RuleSearchMatch::Include => rating >= wanted,
        RuleSearchMatch::Exclude => rating < wanted,
        RuleSearchMatch::Regex => false,
    }
}

/// Whether `program` is an airing of the schedule described by the arguments.
///
/// Time-based types match by overlap with the nominal range on the schedule's
/// channel. Title-based types match by title, restricted to the channel
/// (and the nominal weekday for the weekly variant) where the type says so.
pub fn program_fits(
    recording_type: ScheduleRecordingType,
    name: &str,
    channel_id: ChannelId,
    start: NaiveDateTime,
    end: NaiveDateTime,
    program: &Program,
) -> bool {
    use ScheduleRecordingType::*;

    match recording_type {
        Once | Daily | Weekly | Weekends | WorkingDays => {
            program.channel_id == channel_id && program.overlaps(start, end)
        }
        EveryTimeOnEveryChannel => titles_equal(&program.title, name),
        EveryTimeOnThisChannel => {
            program.channel_id == channel_id && titles_equal(&program.title, name)
        }
        WeeklyEveryTimeOnThisChannel => {
            program.channel_id == channel_id
                && titles_equal(&program.title, name)
                && weekday_of(program.start) == weekday_of(start)
        }
    }
}

/// The listing entry a time-based occurrence records.
///
/// Preference: exact start, then equal title, then the largest overlap.
pub fn best_program<'a>(
    programs: &'a [Program],
    name: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Option<&'a Program> {
    let overlapping = || programs.iter().filter(move |p| p.overlaps(start, end));

    if let Some(exact) = overlapping().find(|p| p.start == start) {
        return Some(exact);
    }
    if let Some(titled) = overlapping().find(|p| titles_equal(&p.title, name)) {
        return Some(titled);
    }
    overlapping().max_by_key(|p| {
        let overlap_start = p.start.max(start);
        let overlap_end = p.end.min(end);
        // max_by_key keeps the last maximum; prefer the earliest on ties
        ((overlap_end - overlap_start).num_seconds(), Reverse(p.start))
    })
}

//! Concrete recording occurrences produced by expansion and rule evaluation.

use chrono::{Duration, NaiveDateTime};

use tunersched_protocol::{
    CardId, ChannelId, EpisodeManagementScheme, Program, ProgramId, RuleId, Schedule, ScheduleId,
    ScheduleRecordingType, ScheduleRule, MANUAL_RECORDING_TITLE,
};

/// Where an occurrence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccurrenceSource {
    /// A persisted schedule.
    Schedule(ScheduleId),
    /// A schedule rule matched against the listing.
    Rule(RuleId),
}

impl OccurrenceSource {
    /// Schedule id as seen by conflicts; rule occurrences use `-rule_id`.
    pub fn schedule_id(self) -> ScheduleId {
        match self {
            OccurrenceSource::Schedule(id) => id,
            OccurrenceSource::Rule(id) => -id,
        }
    }

    pub fn is_rule(self) -> bool {
        matches!(self, OccurrenceSource::Rule(_))
    }
}

/// Season/episode identity of an occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeInfo {
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub title: Option<String>,
}

impl EpisodeInfo {
    pub fn from_program(program: &Program) -> Self {
        Self {
            season: program.season_number,
            episode: program.episode_number,
            title: program.episode_title.clone(),
        }
    }

    /// `(season, episode)` when both are known.
    pub fn number(&self) -> Option<(u32, u32)> {
        Some((self.season?, self.episode?))
    }

    pub fn is_empty(&self) -> bool {
        self.season.is_none() && self.episode.is_none() && self.title.is_none()
    }
}

/// Life cycle of an occurrence within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceState {
    Candidate,
    /// Suppressed by episode management or duplicate detection.
    Deduplicated,
    Assigned(CardId),
    /// Left without a card; recorded in the conflict set.
    Conflicted,
    /// Evicted by a higher priority occurrence; retried next pass.
    Replaced,
    /// Same program already held by another rule occurrence.
    Covered,
}

/// One time-bounded recording candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub source: OccurrenceSource,
    pub channel_id: ChannelId,
    pub name: String,
    /// Nominal start.
    pub start: NaiveDateTime,
    /// Nominal end.
    pub end: NaiveDateTime,
    pub recording_type: ScheduleRecordingType,
    pub priority: i32,
    pub pre_record_minutes: i64,
    pub post_record_minutes: i64,
    /// Listing entry this occurrence records.
    pub program: Option<Program>,
    /// Listing time of a moved program, replacing the nominal range.
    pub actual: Option<(NaiveDateTime, NaiveDateTime)>,
    pub episode: EpisodeInfo,
    pub is_series: bool,
    pub episode_management: Option<EpisodeManagementScheme>,
}

impl Occurrence {
    /// Occurrence of a persisted schedule at the given nominal range.
    pub fn from_schedule(schedule: &Schedule, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            source: OccurrenceSource::Schedule(schedule.id),
            channel_id: schedule.channel_id,
            name: schedule.name.clone(),
            start,
            end,
            recording_type: schedule.recording_type,
            priority: schedule.priority,
            pre_record_minutes: schedule.pre_record_minutes,
            post_record_minutes: schedule.post_record_minutes,
            program: None,
            actual: None,
            episode: EpisodeInfo::default(),
            is_series: schedule.recording_type.is_recurring(),
            episode_management: None,
        }
    }

    /// Synthetic occurrence of a rule match; times come from the program.
    pub fn from_rule(rule: &ScheduleRule, program: Program, episode: EpisodeInfo) -> Self {
        let recording_type = if rule.is_series {
            ScheduleRecordingType::WeeklyEveryTimeOnThisChannel
        } else {
            ScheduleRecordingType::Once
        };

        Self {
            source: OccurrenceSource::Rule(rule.id),
            channel_id: program.channel_id,
            name: program.title.clone(),
            start: program.start,
            end: program.end,
            recording_type,
            priority: rule.priority,
            pre_record_minutes: rule.pre_record_minutes,
            post_record_minutes: rule.post_record_minutes,
            program: Some(program),
            actual: None,
            episode,
            is_series: rule.is_series,
            episode_management: rule.episode_management,
        }
    }

    pub fn schedule_id(&self) -> ScheduleId {
        self.source.schedule_id()
    }

    pub fn is_manual(&self) -> bool {
        self.name.starts_with(MANUAL_RECORDING_TITLE)
    }

    /// Bind the listing entry; its episode data becomes the occurrence's.
    pub fn attach_program(&mut self, program: Program) {
        self.episode = EpisodeInfo::from_program(&program);
        self.program = Some(program);
    }

    pub fn program_id(&self) -> Option<ProgramId> {
        self.program.as_ref().map(|p| p.id)
    }

    /// Actual listing range if resolved, else the nominal one.
    pub fn effective_range(&self) -> (NaiveDateTime, NaiveDateTime) {
        self.actual.unwrap_or((self.start, self.end))
    }

    /// Effective range widened by pre/post padding.
    pub fn padded_range(&self) -> (NaiveDateTime, NaiveDateTime) {
        let (start, end) = self.effective_range();
        (
            start - Duration::minutes(self.pre_record_minutes),
            end + Duration::minutes(self.post_record_minutes),
        )
    }

    /// Lower-cased series name used for episode bookkeeping.
    pub fn series_key(&self) -> String {
        self.program
            .as_ref()
            .map(|p| p.title.as_str())
            .unwrap_or(&self.name)
            .trim()
            .to_lowercase()
    }

    /// Whether the resolved listing time differs from the nominal time by a minute or more.
    pub fn is_moved(&self) -> bool {
        match self.actual {
            Some((start, end)) => {
                (start - self.start).num_minutes().abs() >= 1
                    || (end - self.end).num_minutes().abs() >= 1
            }
            None => false,
        }
    }
}

/// Order by start, then descending priority, then channel.
pub fn sort_occurrences(occurrences: &mut [Occurrence]) {
    occurrences.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.priority.cmp(&a.priority))
            .then(a.channel_id.cmp(&b.channel_id))
    });
}

/// Whether two half-open ranges overlap.
pub fn ranges_overlap(
    a: (NaiveDateTime, NaiveDateTime),
    b: (NaiveDateTime, NaiveDateTime),
) -> bool {
    a.0 < b.1 && b.0 < a.1
}

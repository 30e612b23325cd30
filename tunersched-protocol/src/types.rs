//! Model types for tuner scheduling.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

pub type CardId = i64;
pub type ChannelId = i64;
pub type ChannelGroupId = i64;
pub type ProgramId = i64;
pub type ScheduleId = i64;
pub type RuleId = i64;

/// Title prefix of schedules entered by hand without a listing entry.
///
/// Such schedules are never reconciled against the program guide.
pub const MANUAL_RECORDING_TITLE: &str = "Manual";

/// Case-insensitive title comparison used throughout schedule matching.
pub fn titles_equal(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Decode a 1-based (Monday = 1) weekday number.
pub fn weekday_from_number(value: i32) -> Result<Weekday, ProtocolError> {
    match value {
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        7 => Ok(Weekday::Sun),
        other => Err(ProtocolError::InvalidWeekday(other)),
    }
}

/// Tuner card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    /// Higher priority cards are tried first.
    pub priority: i32,
    /// Maximum number of encrypted services decrypted at once.
    pub decrypt_limit: u32,
    /// Whether several services of one transmitter can be received at once.
    pub supports_sub_channels: bool,
    /// Disabled cards are never allocated.
    pub enabled: bool,
}

impl Card {
    /// Create an enabled card without sub-channel support or CAM.
    pub fn new(id: CardId, name: impl Into<String>, priority: i32) -> Self {
        Self {
            id,
            name: name.into(),
            priority,
            decrypt_limit: 0,
            supports_sub_channels: false,
            enabled: true,
        }
    }

    pub fn with_decrypt_limit(mut self, limit: u32) -> Self {
        self.decrypt_limit = limit;
        self
    }

    pub fn with_sub_channels(mut self) -> Self {
        self.supports_sub_channels = true;
        self
    }
}

/// Channel group (e.g. "Movies", "News").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGroup {
    pub id: ChannelGroupId,
    pub name: String,
}

/// Broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    /// Groups this channel belongs to.
    pub group_ids: Vec<ChannelGroupId>,
}

impl Channel {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            group_ids: Vec::new(),
        }
    }

    pub fn in_group(&self, group_id: ChannelGroupId) -> bool {
        self.group_ids.contains(&group_id)
    }
}

/// Program guide entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub channel_id: ChannelId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub title: String,
    pub description: String,
    pub genre: String,
    pub star_rating: i32,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub episode_title: Option<String>,
}

impl Program {
    pub fn new(
        id: ProgramId,
        channel_id: ChannelId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id,
            channel_id,
            start,
            end,
            title: title.into(),
            description: String::new(),
            genre: String::new(),
            star_rating: 0,
            season_number: None,
            episode_number: None,
            episode_title: None,
        }
    }

    pub fn with_episode(mut self, season: u32, episode: u32) -> Self {
        self.season_number = Some(season);
        self.episode_number = Some(episode);
        self
    }

    /// Whether the program overlaps the half-open range `[start, end)`.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && start < self.end
    }
}

/// Physical carrier a tuning detail points at.
///
/// Two services can be received by one tuning when their transmitters
/// compare equal under [`Transmitter::same_transmitter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Transmitter {
    Analog {
        frequency: i64,
        country: i32,
        video_source: i32,
    },
    Atsc {
        frequency: i64,
        modulation: i32,
    },
    DvbC {
        frequency: i64,
        modulation: i32,
        symbol_rate: i32,
    },
    DvbS {
        frequency: i64,
        modulation: i32,
        symbol_rate: i32,
        polarisation: i32,
        fec_rate: i32,
        roll_off: i32,
    },
    DvbT {
        frequency: i64,
        bandwidth: i32,
    },
    Ip {
        url: String,
    },
}

impl Transmitter {
    /// Channel-type specific multiplex equality.
    ///
    /// Different channel types never share a transmitter.
    pub fn same_transmitter(&self, other: &Transmitter) -> bool {
        use Transmitter::*;

        match (self, other) {
            (
                Analog { frequency: f1, country: c1, video_source: s1 },
                Analog { frequency: f2, country: c2, video_source: s2 },
            ) => f1 == f2 && c1 == c2 && s1 == s2,
            (
                Atsc { frequency: f1, modulation: m1 },
                Atsc { frequency: f2, modulation: m2 },
            ) => f1 == f2 && m1 == m2,
            (
                DvbC { frequency: f1, modulation: m1, symbol_rate: r1 },
                DvbC { frequency: f2, modulation: m2, symbol_rate: r2 },
            ) => f1 == f2 && m1 == m2 && r1 == r2,
            (
                DvbS {
                    frequency: f1,
                    modulation: m1,
                    symbol_rate: r1,
                    polarisation: p1,
                    fec_rate: e1,
                    roll_off: o1,
                },
                DvbS {
                    frequency: f2,
                    modulation: m2,
                    symbol_rate: r2,
                    polarisation: p2,
                    fec_rate: e2,
                    roll_off: o2,
                },
            ) => f1 == f2 && m1 == m2 && r1 == r2 && p1 == p2 && e1 == e2 && o1 == o2,
            (
                DvbT { frequency: f1, bandwidth: b1 },
                DvbT { frequency: f2, bandwidth: b2 },
            ) => f1 == f2 && b1 == b2,
            (Ip { url: u1 }, Ip { url: u2 }) => u1 == u2,
            _ => false,
        }
    }

    /// Short name of the channel type.
    pub fn kind(&self) -> &'static str {
        match self {
            Transmitter::Analog { .. } => "analog",
            Transmitter::Atsc { .. } => "atsc",
            Transmitter::DvbC { .. } => "dvb-c",
            Transmitter::DvbS { .. } => "dvb-s",
            Transmitter::DvbT { .. } => "dvb-t",
            Transmitter::Ip { .. } => "ip",
        }
    }
}

/// Tuning parameters of one channel on one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningDetail {
    pub id: i64,
    pub channel_id: ChannelId,
    pub name: String,
    pub is_encrypted: bool,
    pub transmitter: Transmitter,
}

/// How a persisted schedule repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleRecordingType {
    Once = 0,
    Daily = 1,
    Weekly = 2,
    EveryTimeOnThisChannel = 3,
    EveryTimeOnEveryChannel = 4,
    Weekends = 5,
    WorkingDays = 6,
    WeeklyEveryTimeOnThisChannel = 7,
}

impl ScheduleRecordingType {
    /// Types whose occurrences come from the nominal time of day.
    pub fn is_time_based(self) -> bool {
        matches!(
            self,
            Self::Once | Self::Daily | Self::Weekly | Self::Weekends | Self::WorkingDays
        )
    }

    /// Types whose occurrences come from listings with an equal title.
    pub fn is_title_based(self) -> bool {
        !self.is_time_based()
    }

    pub fn is_recurring(self) -> bool {
        self != Self::Once
    }
}

impl TryFrom<i32> for ScheduleRecordingType {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Once),
            1 => Ok(Self::Daily),
            2 => Ok(Self::Weekly),
            3 => Ok(Self::EveryTimeOnThisChannel),
            4 => Ok(Self::EveryTimeOnEveryChannel),
            5 => Ok(Self::Weekends),
            6 => Ok(Self::WorkingDays),
            7 => Ok(Self::WeeklyEveryTimeOnThisChannel),
            other => Err(ProtocolError::UnknownRecordingType(other)),
        }
    }
}

/// Retention policy of recordings made by a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeepMethod {
    UntilSpaceNeeded = 0,
    UntilWatched = 1,
    TillDate = 2,
    Always = 3,
}

impl TryFrom<i32> for KeepMethod {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::UntilSpaceNeeded),
            1 => Ok(Self::UntilWatched),
            2 => Ok(Self::TillDate),
            3 => Ok(Self::Always),
            other => Err(ProtocolError::UnknownKeepMethod(other)),
        }
    }
}

/// Policy deciding whether a series episode is worth recording again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EpisodeManagementScheme {
    #[default]
    None = 0,
    /// Only episodes newer than the latest known one.
    NewEpisodesByEpisodeNumber = 1,
    /// Any episode whose season/episode number is not known yet.
    MissingEpisodesByEpisodeNumber = 2,
    /// Any episode whose episode title is not known yet.
    MissingEpisodesByEpisodeName = 3,
}

impl TryFrom<i32> for EpisodeManagementScheme {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::NewEpisodesByEpisodeNumber),
            2 => Ok(Self::MissingEpisodesByEpisodeNumber),
            3 => Ok(Self::MissingEpisodesByEpisodeName),
            other => Err(ProtocolError::UnknownEpisodeManagement(other)),
        }
    }
}

/// Persisted recording intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    /// Recurring schedule this one was split off from.
    pub parent_id: Option<ScheduleId>,
    /// Rule that materialized this schedule.
    pub rule_id: Option<RuleId>,
    pub channel_id: ChannelId,
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub recording_type: ScheduleRecordingType,
    pub priority: i32,
    pub pre_record_minutes: i64,
    pub post_record_minutes: i64,
    pub keep_method: KeepMethod,
    pub keep_date: Option<NaiveDateTime>,
}

impl Schedule {
    pub fn new(
        id: ScheduleId,
        channel_id: ChannelId,
        name: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        recording_type: ScheduleRecordingType,
    ) -> Self {
        Self {
            id,
            parent_id: None,
            rule_id: None,
            channel_id,
            name: name.into(),
            start,
            end,
            recording_type,
            priority: 0,
            pre_record_minutes: 0,
            post_record_minutes: 0,
            keep_method: KeepMethod::Always,
            keep_date: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_padding(mut self, pre_minutes: i64, post_minutes: i64) -> Self {
        self.pre_record_minutes = pre_minutes;
        self.post_record_minutes = post_minutes;
        self
    }

    /// Hand-entered schedules carry a placeholder title.
    pub fn is_manual(&self) -> bool {
        self.name.starts_with(MANUAL_RECORDING_TITLE)
    }

    /// Whether the nominal end falls on a later calendar day than the start.
    pub fn is_overnight(&self) -> bool {
        self.end.date() != self.start.date()
    }

    /// End of the recording including post padding.
    pub fn padded_end(&self) -> NaiveDateTime {
        self.end + Duration::minutes(self.post_record_minutes)
    }
}

/// One suppressed occurrence of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanceledSchedule {
    pub schedule_id: ScheduleId,
    pub start: NaiveDateTime,
}

/// Program field a rule target inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSearchTarget {
    Title,
    Description,
    Genre,
    StarRating,
    EpisodeTitle,
}

/// How a rule target compares its text against the program field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSearchMatch {
    Exact,
    Include,
    Exclude,
    Regex,
}

/// One predicate of a schedule rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTarget {
    pub field: RuleSearchTarget,
    pub mode: RuleSearchMatch,
    pub text: String,
}

impl SearchTarget {
    pub fn new(field: RuleSearchTarget, mode: RuleSearchMatch, text: impl Into<String>) -> Self {
        Self {
            field,
            mode,
            text: text.into(),
        }
    }
}

/// Where season/episode information comes from when the listing lacks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EpisodeInfoFallback {
    #[default]
    None = 0,
    /// Named groups `SeasonNo`/`EpisodeNo` matched against the title.
    TitleContainsSeasonEpisodeRegex = 1,
    /// Named groups `SeasonNo`/`EpisodeNo` matched against the description.
    DescriptionContainsSeasonEpisodeRegex = 2,
    /// Named groups `SeasonNo`/`EpisodeNo` matched against the episode title.
    EpisodeTitleContainsSeasonEpisodeRegex = 3,
    TitleIsEpisodeName = 4,
    DescriptionIsEpisodeName = 5,
}

impl TryFrom<i32> for EpisodeInfoFallback {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::TitleContainsSeasonEpisodeRegex),
            2 => Ok(Self::DescriptionContainsSeasonEpisodeRegex),
            3 => Ok(Self::EpisodeTitleContainsSeasonEpisodeRegex),
            4 => Ok(Self::TitleIsEpisodeName),
            5 => Ok(Self::DescriptionIsEpisodeName),
            other => Err(ProtocolError::UnknownEpisodeInfoFallback(other)),
        }
    }
}

/// Which of a rule's matches are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RuleRecordingType {
    /// First match only; the rule deactivates once it fires.
    Once = 0,
    #[default]
    All = 1,
    /// Pins the channel of the first match.
    AllOnSameChannel = 2,
    /// Pins the weekday of the first match.
    AllOnSameDay = 3,
    AllOnSameChannelAndDay = 4,
}

impl RuleRecordingType {
    pub fn pins_channel(self) -> bool {
        matches!(self, Self::AllOnSameChannel | Self::AllOnSameChannelAndDay)
    }

    pub fn pins_day(self) -> bool {
        matches!(self, Self::AllOnSameDay | Self::AllOnSameChannelAndDay)
    }
}

impl TryFrom<i32> for RuleRecordingType {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Once),
            1 => Ok(Self::All),
            2 => Ok(Self::AllOnSameChannel),
            3 => Ok(Self::AllOnSameDay),
            4 => Ok(Self::AllOnSameChannelAndDay),
            other => Err(ProtocolError::UnknownRuleRecordingType(other)),
        }
    }
}

/// Template that records every program matching its predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: RuleId,
    pub name: String,
    pub active: bool,
    /// Explicit channel; takes precedence over `channel_group_id`.
    pub channel_id: Option<ChannelId>,
    pub channel_group_id: Option<ChannelGroupId>,
    pub on_or_after_day: Option<Weekday>,
    pub on_or_before_day: Option<Weekday>,
    pub start_from_time: Option<NaiveTime>,
    pub start_to_time: Option<NaiveTime>,
    pub targets: Vec<SearchTarget>,
    pub is_series: bool,
    pub series_name: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub episode_title: Option<String>,
    pub episode_info_fallback: EpisodeInfoFallback,
    pub episode_info_fallback_pattern: Option<String>,
    pub recording_type: RuleRecordingType,
    /// Overrides the global scheme when set.
    pub episode_management: Option<EpisodeManagementScheme>,
    pub priority: i32,
    pub pre_record_minutes: i64,
    pub post_record_minutes: i64,
    pub keep_method: KeepMethod,
    pub keep_date: Option<NaiveDateTime>,
}

impl ScheduleRule {
    /// Create an active, unconstrained rule recording every match.
    pub fn new(id: RuleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            channel_id: None,
            channel_group_id: None,
            on_or_after_day: None,
            on_or_before_day: None,
            start_from_time: None,
            start_to_time: None,
            targets: Vec::new(),
            is_series: false,
            series_name: None,
            season_number: None,
            episode_number: None,
            episode_title: None,
            episode_info_fallback: EpisodeInfoFallback::None,
            episode_info_fallback_pattern: None,
            recording_type: RuleRecordingType::All,
            episode_management: None,
            priority: 0,
            pre_record_minutes: 0,
            post_record_minutes: 0,
            keep_method: KeepMethod::Always,
            keep_date: None,
        }
    }

    pub fn with_target(
        mut self,
        field: RuleSearchTarget,
        mode: RuleSearchMatch,
        text: impl Into<String>,
    ) -> Self {
        self.targets.push(SearchTarget::new(field, mode, text));
        self
    }

    pub fn on_channel(mut self, channel_id: ChannelId) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    /// Schedule id carried by occurrences generated from this rule.
    ///
    /// Negative so it never collides with a persisted schedule id.
    pub fn occurrence_id(&self) -> ScheduleId {
        -self.id
    }

    pub fn has_series_constraints(&self) -> bool {
        self.season_number.is_some()
            || self.episode_number.is_some()
            || self.episode_title.is_some()
    }
}

/// Two occurrences that could not both be honored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: i64,
    /// Card the conflict happened on; `None` when no card can tune the channel.
    pub card_id: Option<CardId>,
    pub channel_id: ChannelId,
    /// Occurrence left without a card.
    pub schedule_id: ScheduleId,
    /// Occurrence holding the card.
    pub conflicting_schedule_id: Option<ScheduleId>,
    pub program_start_time: NaiveDateTime,
}

impl Conflict {
    pub fn involves(&self, schedule_id: ScheduleId) -> bool {
        self.schedule_id == schedule_id || self.conflicting_schedule_id == Some(schedule_id)
    }

    /// Equality ignoring the store-assigned id.
    pub fn same_as(&self, other: &Conflict) -> bool {
        self.card_id == other.card_id
            && self.channel_id == other.channel_id
            && self.schedule_id == other.schedule_id
            && self.conflicting_schedule_id == other.conflicting_schedule_id
            && self.program_start_time == other.program_start_time
    }
}

/// Existing recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub id: i64,
    pub channel_id: Option<ChannelId>,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Episode already present in the media library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownEpisode {
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub episode_title: Option<String>,
}

/// Series known to the media library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownSeries {
    pub name: String,
    pub episodes: Vec<KnownEpisode>,
}

/// Per-program scheduling flags published after a full pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RecordingStatus(u32);

impl RecordingStatus {
    pub const NONE: Self = Self(0);
    pub const SCHEDULED: Self = Self(0x01);
    pub const SERIES_SCHEDULED: Self = Self(0x02);
    pub const RULE_SCHEDULED: Self = Self(0x04);
    pub const CONFLICT: Self = Self(0x08);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits & 0x0F)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Whether `day` lies in the inclusive range `[after, before]`.
///
/// Absent bounds are unconstrained; a range whose lower bound lies after
/// its upper bound wraps around the end of the week.
pub fn weekday_in_range(day: Weekday, after: Option<Weekday>, before: Option<Weekday>) -> bool {
    let d = day.num_days_from_monday();
    match (after, before) {
        (None, None) => true,
        (Some(a), None) => d >= a.num_days_from_monday(),
        (None, Some(b)) => d <= b.num_days_from_monday(),
        (Some(a), Some(b)) => {
            let (a, b) = (a.num_days_from_monday(), b.num_days_from_monday());
            if a <= b {
                a <= d && d <= b
            } else {
                d >= a || d <= b
            }
        }
    }
}

/// Whether `time` lies in the inclusive range `[from, to]`, wrapping at midnight.
pub fn time_in_range(time: NaiveTime, from: Option<NaiveTime>, to: Option<NaiveTime>) -> bool {
    match (from, to) {
        (None, None) => true,
        (Some(f), None) => time >= f,
        (None, Some(t)) => time <= t,
        (Some(f), Some(t)) if f <= t => f <= time && time <= t,
        (Some(f), Some(t)) => time >= f || time <= t,
    }
}

/// Weekday of a timestamp.
pub fn weekday_of(time: NaiveDateTime) -> Weekday {
    time.date().weekday()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_same_transmitter_per_type() {
        let c1 = Transmitter::DvbC { frequency: 346_000, modulation: 64, symbol_rate: 6900 };
        let c2 = Transmitter::DvbC { frequency: 346_000, modulation: 64, symbol_rate: 6900 };
        let c3 = Transmitter::DvbC { frequency: 346_000, modulation: 256, symbol_rate: 6900 };
        assert!(c1.same_transmitter(&c2));
        assert!(!c1.same_transmitter(&c3));

        let t = Transmitter::DvbT { frequency: 346_000, bandwidth: 8 };
        assert!(!c1.same_transmitter(&t));

        let ip1 = Transmitter::Ip { url: "udp://239.0.0.1:1234".into() };
        let ip2 = Transmitter::Ip { url: "udp://239.0.0.2:1234".into() };
        assert!(!ip1.same_transmitter(&ip2));
        assert!(ip1.same_transmitter(&ip1.clone()));
    }

    #[test]
    fn test_dvbs_compares_satellite_fields() {
        let base = Transmitter::DvbS {
            frequency: 11_493_750,
            modulation: 2,
            symbol_rate: 22_000,
            polarisation: 1,
            fec_rate: 3,
            roll_off: 0,
        };
        let other_pol = Transmitter::DvbS {
            frequency: 11_493_750,
            modulation: 2,
            symbol_rate: 22_000,
            polarisation: 2,
            fec_rate: 3,
            roll_off: 0,
        };
        assert!(base.same_transmitter(&base.clone()));
        assert!(!base.same_transmitter(&other_pol));
    }

    #[test]
    fn test_weekday_range_wraps() {
        assert!(weekday_in_range(Weekday::Sun, Some(Weekday::Fri), Some(Weekday::Mon)));
        assert!(weekday_in_range(Weekday::Mon, Some(Weekday::Fri), Some(Weekday::Mon)));
        assert!(!weekday_in_range(Weekday::Wed, Some(Weekday::Fri), Some(Weekday::Mon)));
        assert!(weekday_in_range(Weekday::Wed, Some(Weekday::Tue), None));
        assert!(!weekday_in_range(Weekday::Mon, Some(Weekday::Tue), None));
    }

    #[test]
    fn test_time_range_wraps_midnight() {
        let from = NaiveTime::from_hms_opt(22, 0, 0);
        let to = NaiveTime::from_hms_opt(2, 0, 0);
        assert!(time_in_range(NaiveTime::from_hms_opt(23, 30, 0).unwrap(), from, to));
        assert!(time_in_range(NaiveTime::from_hms_opt(1, 0, 0).unwrap(), from, to));
        assert!(!time_in_range(NaiveTime::from_hms_opt(12, 0, 0).unwrap(), from, to));
    }

    #[test]
    fn test_schedule_flags() {
        let manual = Schedule::new(1, 1, "Manual (BBC One)", at(20, 0), at(21, 0), ScheduleRecordingType::Once);
        assert!(manual.is_manual());
        assert!(!manual.is_overnight());

        let late = Schedule::new(
            2,
            1,
            "Late Show",
            at(23, 30),
            at(23, 30) + Duration::hours(1),
            ScheduleRecordingType::Daily,
        );
        assert!(late.is_overnight());
        assert!(late.recording_type.is_time_based());
        assert!(ScheduleRecordingType::EveryTimeOnEveryChannel.is_title_based());
    }

    #[test]
    fn test_recording_type_discriminants() {
        assert_eq!(
            ScheduleRecordingType::try_from(7i32),
            Ok(ScheduleRecordingType::WeeklyEveryTimeOnThisChannel)
        );
        assert_eq!(
            ScheduleRecordingType::try_from(9i32),
            Err(ProtocolError::UnknownRecordingType(9))
        );
        assert_eq!(ScheduleRecordingType::Weekends as i32, 5);
    }

    #[test]
    fn test_recording_status_flags() {
        let mut status = RecordingStatus::NONE;
        assert!(status.is_none());
        status.insert(RecordingStatus::RULE_SCHEDULED);
        status.insert(RecordingStatus::CONFLICT);
        assert!(status.contains(RecordingStatus::CONFLICT));
        assert!(!status.contains(RecordingStatus::SCHEDULED));
        assert_eq!(RecordingStatus::from_bits(status.bits()), status);
    }

    #[test]
    fn test_transmitter_serializes_tagged() {
        let t = Transmitter::DvbT { frequency: 506_000, bandwidth: 8 };
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"type\":\"DvbT\""));
        let back: Transmitter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}

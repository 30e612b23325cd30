//! Schedule rule evaluation against program listings.

use chrono::Datelike;
use log::debug;
use regex::Regex;

use tunersched_protocol::{
    time_in_range, titles_equal, weekday_in_range, ChannelId, EpisodeInfoFallback, Program,
    RuleRecordingType, RuleSearchMatch, RuleSearchTarget, ScheduleRule, SearchTarget,
};

use super::cache::ScheduleCache;
use super::matching::{compile_pattern, rating_matches, text_matches};
use super::occurrence::{sort_occurrences, EpisodeInfo, Occurrence};

/// Used when a regex fallback is selected without a pattern.
pub const DEFAULT_EPISODE_PATTERN: &str = r"S(?<SeasonNo>\d{1,2})E(?<EpisodeNo>\d{1,3})";

struct CompiledTarget {
    target: SearchTarget,
    regex: Option<Regex>,
}

impl CompiledTarget {
    fn new(target: &SearchTarget) -> Self {
        let regex = match target.mode {
            RuleSearchMatch::Regex => compile_pattern(&target.text),
            _ => None,
        };
        Self {
            target: target.clone(),
            regex,
        }
    }

    fn matches(&self, program: &Program) -> bool {
        let SearchTarget { field, mode, text } = &self.target;
        let regex = self.regex.as_ref();

        match field {
            RuleSearchTarget::Title => text_matches(*mode, &program.title, text, regex),
            RuleSearchTarget::Description => text_matches(*mode, &program.description, text, regex),
            RuleSearchTarget::Genre => text_matches(*mode, &program.genre, text, regex),
            RuleSearchTarget::EpisodeTitle => text_matches(
                *mode,
                program.episode_title.as_deref().unwrap_or_default(),
                text,
                regex,
            ),
            RuleSearchTarget::StarRating => rating_matches(*mode, program.star_rating, text, regex),
        }
    }
}

/// A rule with its patterns compiled once per pass.
pub struct CompiledRule {
    pub rule: ScheduleRule,
    targets: Vec<CompiledTarget>,
    episode_pattern: Option<Regex>,
}

impl CompiledRule {
    pub fn new(rule: ScheduleRule) -> Self {
        let targets = rule.targets.iter().map(CompiledTarget::new).collect();
        let episode_pattern = match rule.episode_info_fallback {
            EpisodeInfoFallback::TitleContainsSeasonEpisodeRegex
            | EpisodeInfoFallback::DescriptionContainsSeasonEpisodeRegex
            | EpisodeInfoFallback::EpisodeTitleContainsSeasonEpisodeRegex => compile_pattern(
                rule.episode_info_fallback_pattern
                    .as_deref()
                    .unwrap_or(DEFAULT_EPISODE_PATTERN),
            ),
            _ => None,
        };

        Self {
            rule,
            targets,
            episode_pattern,
        }
    }

    fn in_time_slot(&self, program: &Program) -> bool {
        weekday_in_range(
            program.start.weekday(),
            self.rule.on_or_after_day,
            self.rule.on_or_before_day,
        ) && time_in_range(
            program.start.time(),
            self.rule.start_from_time,
            self.rule.start_to_time,
        )
    }

    /// Episode identity from the listing, completed by the configured fallback.
    pub fn episode_info(&self, program: &Program) -> EpisodeInfo {
        let mut info = EpisodeInfo::from_program(program);

        let source = match self.rule.episode_info_fallback {
            EpisodeInfoFallback::None => return info,
            EpisodeInfoFallback::TitleIsEpisodeName => {
                if info.title.is_none() {
                    info.title = Some(program.title.clone());
                }
                return info;
            }
            EpisodeInfoFallback::DescriptionIsEpisodeName => {
                if info.title.is_none() && !program.description.trim().is_empty() {
                    info.title = Some(program.description.clone());
                }
                return info;
            }
            EpisodeInfoFallback::TitleContainsSeasonEpisodeRegex => program.title.as_str(),
            EpisodeInfoFallback::DescriptionContainsSeasonEpisodeRegex => {
                program.description.as_str()
            }
            EpisodeInfoFallback::EpisodeTitleContainsSeasonEpisodeRegex => {
                program.episode_title.as_deref().unwrap_or_default()
            }
        };

        let Some(captures) = self.episode_pattern.as_ref().and_then(|p| p.captures(source)) else {
            return info;
        };
        let number = |name: &str| {
            captures
                .name(name)
                .and_then(|m| m.as_str().trim().parse::<u32>().ok())
        };

        if info.season.is_none() {
            info.season = number("SeasonNo");
        }
        if info.episode.is_none() {
            info.episode = number("EpisodeNo");
        }
        if info.title.is_none() {
            info.title = captures
                .name("EpisodeTitle")
                .map(|m| m.as_str().trim().to_string())
                .filter(|t| !t.is_empty());
        }
        info
    }

    fn satisfies_series(&self, program: &Program, info: &EpisodeInfo) -> bool {
        let rule = &self.rule;
        if !rule.is_series {
            return true;
        }
        if let Some(name) = &rule.series_name {
            if !titles_equal(&program.title, name) {
                return false;
            }
        }
        if rule.season_number.is_some() && info.season != rule.season_number {
            return false;
        }
        if rule.episode_number.is_some() && info.episode != rule.episode_number {
            return false;
        }
        if let Some(wanted) = &rule.episode_title {
            match &info.title {
                Some(title) if titles_equal(title, wanted) => {}
                _ => return false,
            }
        }
        true
    }

    /// Evaluate the rule against one program.
    pub fn matches(&self, program: &Program) -> Option<EpisodeInfo> {
        if !self.in_time_slot(program) {
            return None;
        }
        if !self.targets.iter().all(|t| t.matches(program)) {
            return None;
        }
        let info = self.episode_info(program);
        self.satisfies_series(program, &info).then_some(info)
    }
}

/// Channels a rule searches: its channel, else its group, else all.
pub fn target_channels(cache: &ScheduleCache, rule: &ScheduleRule) -> Vec<ChannelId> {
    if let Some(channel_id) = rule.channel_id {
        return vec![channel_id];
    }
    match rule.channel_group_id {
        Some(group_id) => cache
            .channels
            .iter()
            .filter(|c| c.in_group(group_id))
            .map(|c| c.id)
            .collect(),
        None => cache.channel_ids(),
    }
}

/// Programs in the pass window a rule would record, in start order.
pub async fn matching_programs(
    cache: &mut ScheduleCache,
    rule: &CompiledRule,
) -> Vec<(Program, EpisodeInfo)> {
    let (now, window_end) = (cache.now, cache.window_end);
    let mut matches = Vec::new();

    for channel_id in target_channels(cache, &rule.rule) {
        for program in cache.programs(channel_id).await {
            if program.end <= now || program.start >= window_end {
                continue;
            }
            if let Some(info) = rule.matches(&program) {
                matches.push((program, info));
            }
        }
    }
    matches.sort_by(|a, b| (a.0.start, a.0.channel_id).cmp(&(b.0.start, b.0.channel_id)));

    let recording_type = rule.rule.recording_type;
    let Some((first, _)) = matches.first() else {
        return matches;
    };
    let (first_channel, first_day) = (first.channel_id, first.start.weekday());

    if recording_type == RuleRecordingType::Once {
        matches.truncate(1);
    }
    if recording_type.pins_channel() && rule.rule.channel_id.is_none() {
        matches.retain(|(p, _)| p.channel_id == first_channel);
    }
    if recording_type.pins_day() && rule.rule.on_or_after_day.is_none() {
        matches.retain(|(p, _)| p.start.weekday() == first_day);
    }
    matches
}

/// Synthesize occurrences for every active rule.
pub async fn evaluate(cache: &mut ScheduleCache, rules: &[ScheduleRule]) -> Vec<Occurrence> {
    let mut occurrences = Vec::new();

    for rule in rules.iter().filter(|r| r.active) {
        let compiled = CompiledRule::new(rule.clone());
        let matches = matching_programs(cache, &compiled).await;
        debug!("RuleEngine: rule {} ({}) matched {} program(s)", rule.id, rule.name, matches.len());

        occurrences.extend(
            matches
                .into_iter()
                .map(|(program, info)| Occurrence::from_rule(rule, program, info)),
        );
    }

    sort_occurrences(&mut occurrences);
    occurrences
}

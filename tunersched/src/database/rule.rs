//! Schedule rule CRUD operations.

use chrono::Weekday;
use rusqlite::{params, Row};

use tunersched_protocol::{
    weekday_from_number, EpisodeInfoFallback, EpisodeManagementScheme, KeepMethod, RuleId,
    RuleRecordingType, ScheduleRule, SearchTarget,
};

use super::{conversion_error, Database, Result};

const RULE_COLUMNS: &str = "id, name, active, channel_id, channel_group_id, on_or_after_day,
    on_or_before_day, start_from_time, start_to_time, targets, is_series, series_name,
    season_number, episode_number, episode_title, episode_info_fallback,
    episode_info_fallback_pattern, recording_type, episode_management, priority,
    pre_record_minutes, post_record_minutes, keep_method, keep_date";

fn day_to_sql(day: Option<Weekday>) -> Option<u32> {
    day.map(|d| d.number_from_monday())
}

fn day_from_sql(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Weekday>> {
    row.get::<_, Option<i32>>(idx)?
        .map(|n| weekday_from_number(n).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleRule> {
    let targets: String = row.get(9)?;
    let targets: Vec<SearchTarget> = serde_json::from_str(&targets).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let episode_info_fallback = EpisodeInfoFallback::try_from(row.get::<_, i32>(15)?)
        .map_err(|e| conversion_error(15, e))?;
    let recording_type = RuleRecordingType::try_from(row.get::<_, i32>(17)?)
        .map_err(|e| conversion_error(17, e))?;
    let episode_management = row
        .get::<_, Option<i32>>(18)?
        .map(|v| EpisodeManagementScheme::try_from(v).map_err(|e| conversion_error(18, e)))
        .transpose()?;
    let keep_method =
        KeepMethod::try_from(row.get::<_, i32>(22)?).map_err(|e| conversion_error(22, e))?;

    Ok(ScheduleRule {
        id: row.get(0)?,
        name: row.get(1)?,
        active: row.get::<_, i32>(2)? != 0,
        channel_id: row.get(3)?,
        channel_group_id: row.get(4)?,
        on_or_after_day: day_from_sql(row, 5)?,
        on_or_before_day: day_from_sql(row, 6)?,
        start_from_time: row.get(7)?,
        start_to_time: row.get(8)?,
        targets,
        is_series: row.get::<_, i32>(10)? != 0,
        series_name: row.get(11)?,
        season_number: row.get(12)?,
        episode_number: row.get(13)?,
        episode_title: row.get(14)?,
        episode_info_fallback,
        episode_info_fallback_pattern: row.get(16)?,
        recording_type,
        episode_management,
        priority: row.get(19)?,
        pre_record_minutes: row.get(20)?,
        post_record_minutes: row.get(21)?,
        keep_method,
        keep_date: row.get(23)?,
    })
}

impl Database {
    /// Insert a rule; the stored id is returned and `rule.id` ignored.
    pub fn insert_rule(&self, rule: &ScheduleRule) -> Result<RuleId> {
        let targets = serde_json::to_string(&rule.targets)?;
        self.conn.execute(
            "INSERT INTO schedule_rules (name, active, channel_id, channel_group_id,
                on_or_after_day, on_or_before_day, start_from_time, start_to_time, targets,
                is_series, series_name, season_number, episode_number, episode_title,
                episode_info_fallback, episode_info_fallback_pattern, recording_type,
                episode_management, priority, pre_record_minutes, post_record_minutes,
                keep_method, keep_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                rule.name,
                rule.active as i32,
                rule.channel_id,
                rule.channel_group_id,
                day_to_sql(rule.on_or_after_day),
                day_to_sql(rule.on_or_before_day),
                rule.start_from_time,
                rule.start_to_time,
                targets,
                rule.is_series as i32,
                rule.series_name,
                rule.season_number,
                rule.episode_number,
                rule.episode_title,
                rule.episode_info_fallback as i32,
                rule.episode_info_fallback_pattern,
                rule.recording_type as i32,
                rule.episode_management.map(|s| s as i32),
                rule.priority,
                rule.pre_record_minutes,
                rule.post_record_minutes,
                rule.keep_method as i32,
                rule.keep_date
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_all_rules(&self) -> Result<Vec<ScheduleRule>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM schedule_rules ORDER BY id", RULE_COLUMNS))?;
        let rules = stmt
            .query_map([], rule_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Update a rule in place. Returns false if it no longer exists.
    pub fn update_rule(&self, rule: &ScheduleRule) -> Result<bool> {
        let targets = serde_json::to_string(&rule.targets)?;
        let changed = self.conn.execute(
            "UPDATE schedule_rules SET name = ?1, active = ?2, channel_id = ?3,
                channel_group_id = ?4, on_or_after_day = ?5, on_or_before_day = ?6,
                start_from_time = ?7, start_to_time = ?8, targets = ?9, is_series = ?10,
                series_name = ?11, season_number = ?12, episode_number = ?13,
                episode_title = ?14, episode_info_fallback = ?15,
                episode_info_fallback_pattern = ?16, recording_type = ?17,
                episode_management = ?18, priority = ?19, pre_record_minutes = ?20,
                post_record_minutes = ?21, keep_method = ?22, keep_date = ?23
             WHERE id = ?24",
            params![
                rule.name,
                rule.active as i32,
                rule.channel_id,
                rule.channel_group_id,
                day_to_sql(rule.on_or_after_day),
                day_to_sql(rule.on_or_before_day),
                rule.start_from_time,
                rule.start_to_time,
                targets,
                rule.is_series as i32,
                rule.series_name,
                rule.season_number,
                rule.episode_number,
                rule.episode_title,
                rule.episode_info_fallback as i32,
                rule.episode_info_fallback_pattern,
                rule.recording_type as i32,
                rule.episode_management.map(|s| s as i32),
                rule.priority,
                rule.pre_record_minutes,
                rule.post_record_minutes,
                rule.keep_method as i32,
                rule.keep_date,
                rule.id
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_rule(&self, id: RuleId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM schedule_rules WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

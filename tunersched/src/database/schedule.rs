//! Schedule and canceled occurrence CRUD operations.

use rusqlite::{params, Row};

use tunersched_protocol::{CanceledSchedule, KeepMethod, Schedule, ScheduleId, ScheduleRecordingType};

use super::{conversion_error, Database, Result};

const SCHEDULE_COLUMNS: &str = "id, parent_id, rule_id, channel_id, name, start_time, end_time,
    recording_type, priority, pre_record_minutes, post_record_minutes, keep_method, keep_date";

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    let recording_type = ScheduleRecordingType::try_from(row.get::<_, i32>(7)?)
        .map_err(|e| conversion_error(7, e))?;
    let keep_method =
        KeepMethod::try_from(row.get::<_, i32>(11)?).map_err(|e| conversion_error(11, e))?;

    Ok(Schedule {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        rule_id: row.get(2)?,
        channel_id: row.get(3)?,
        name: row.get(4)?,
        start: row.get(5)?,
        end: row.get(6)?,
        recording_type,
        priority: row.get(8)?,
        pre_record_minutes: row.get(9)?,
        post_record_minutes: row.get(10)?,
        keep_method,
        keep_date: row.get(12)?,
    })
}

impl Database {
    /// Insert a schedule; the stored id is returned and `schedule.id` ignored.
    pub fn insert_schedule(&self, schedule: &Schedule) -> Result<ScheduleId> {
        self.conn.execute(
            "INSERT INTO schedules (parent_id, rule_id, channel_id, name, start_time, end_time,
                                    recording_type, priority, pre_record_minutes,
                                    post_record_minutes, keep_method, keep_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                schedule.parent_id,
                schedule.rule_id,
                schedule.channel_id,
                schedule.name,
                schedule.start,
                schedule.end,
                schedule.recording_type as i32,
                schedule.priority,
                schedule.pre_record_minutes,
                schedule.post_record_minutes,
                schedule.keep_method as i32,
                schedule.keep_date
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_schedule(&self, id: ScheduleId) -> Result<Option<Schedule>> {
        let result = self.conn.query_row(
            &format!("SELECT {} FROM schedules WHERE id = ?1", SCHEDULE_COLUMNS),
            params![id],
            schedule_from_row,
        );

        match result {
            Ok(schedule) => Ok(Some(schedule)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_all_schedules(&self) -> Result<Vec<Schedule>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM schedules ORDER BY id", SCHEDULE_COLUMNS))?;
        let schedules = stmt
            .query_map([], schedule_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    /// Update a schedule in place. Returns false if it no longer exists.
    pub fn update_schedule(&self, schedule: &Schedule) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE schedules SET parent_id = ?1, rule_id = ?2, channel_id = ?3, name = ?4,
                start_time = ?5, end_time = ?6, recording_type = ?7, priority = ?8,
                pre_record_minutes = ?9, post_record_minutes = ?10, keep_method = ?11,
                keep_date = ?12, updated_at = strftime('%s', 'now')
             WHERE id = ?13",
            params![
                schedule.parent_id,
                schedule.rule_id,
                schedule.channel_id,
                schedule.name,
                schedule.start,
                schedule.end,
                schedule.recording_type as i32,
                schedule.priority,
                schedule.pre_record_minutes,
                schedule.post_record_minutes,
                schedule.keep_method as i32,
                schedule.keep_date,
                schedule.id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete a schedule and its canceled occurrences.
    pub fn delete_schedule(&self, id: ScheduleId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM schedules WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn insert_canceled_schedule(&self, canceled: &CanceledSchedule) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO canceled_schedules (schedule_id, start_time) VALUES (?1, ?2)",
            params![canceled.schedule_id, canceled.start],
        )?;
        Ok(())
    }

    pub fn get_canceled_schedules(&self) -> Result<Vec<CanceledSchedule>> {
        let mut stmt = self.conn.prepare(
            "SELECT schedule_id, start_time FROM canceled_schedules ORDER BY schedule_id, start_time",
        )?;
        let canceled = stmt
            .query_map([], |row| {
                Ok(CanceledSchedule {
                    schedule_id: row.get(0)?,
                    start: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(canceled)
    }
}

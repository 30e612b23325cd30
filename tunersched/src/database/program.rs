//! Program guide storage.

use chrono::NaiveDateTime;
use rusqlite::{params, Row};

use tunersched_protocol::{ChannelId, Program, ProgramId, RecordingStatus};

use super::{Database, Result};

const PROGRAM_COLUMNS: &str = "id, channel_id, start_time, end_time, title, description, genre,
    star_rating, season_number, episode_number, episode_title";

fn program_from_row(row: &Row<'_>) -> rusqlite::Result<Program> {
    Ok(Program {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        start: row.get(2)?,
        end: row.get(3)?,
        title: row.get(4)?,
        description: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        genre: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        star_rating: row.get::<_, Option<i32>>(7)?.unwrap_or(0),
        season_number: row.get(8)?,
        episode_number: row.get(9)?,
        episode_title: row.get(10)?,
    })
}

impl Database {
    pub fn insert_program(&self, program: &Program) -> Result<ProgramId> {
        self.conn.execute(
            "INSERT INTO programs (channel_id, start_time, end_time, title, description, genre,
                                   star_rating, season_number, episode_number, episode_title)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                program.channel_id,
                program.start,
                program.end,
                program.title,
                program.description,
                program.genre,
                program.star_rating,
                program.season_number,
                program.episode_number,
                program.episode_title
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Programs of a channel overlapping `[from, to)`, ordered by start.
    pub fn get_programs_for_channel(
        &self,
        channel_id: ChannelId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Program>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM programs
             WHERE channel_id = ?1 AND start_time < ?3 AND end_time > ?2
             ORDER BY start_time",
            PROGRAM_COLUMNS
        ))?;

        let programs = stmt
            .query_map(params![channel_id, from, to], program_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(programs)
    }

    /// Programs with the given title on any channel overlapping `[from, to)`.
    pub fn get_programs_by_title(
        &self,
        title: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Program>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM programs
             WHERE title = ?1 COLLATE NOCASE AND start_time < ?3 AND end_time > ?2
             ORDER BY start_time, channel_id",
            PROGRAM_COLUMNS
        ))?;

        let programs = stmt
            .query_map(params![title.trim(), from, to], program_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(programs)
    }

    /// Replace all program recording statuses in one transaction.
    pub fn replace_recording_statuses(
        &mut self,
        statuses: &[(ProgramId, RecordingStatus)],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE programs SET recording_status = 0 WHERE recording_status != 0",
            [],
        )?;
        {
            let mut stmt = tx.prepare("UPDATE programs SET recording_status = ?1 WHERE id = ?2")?;
            for (program_id, status) in statuses {
                stmt.execute(params![status.bits(), program_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_recording_status(&self, program_id: ProgramId) -> Result<Option<RecordingStatus>> {
        let result = self.conn.query_row(
            "SELECT recording_status FROM programs WHERE id = ?1",
            params![program_id],
            |row| row.get::<_, Option<u32>>(0),
        );

        match result {
            Ok(bits) => Ok(Some(RecordingStatus::from_bits(bits.unwrap_or(0)))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

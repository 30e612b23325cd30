//! Existing recordings and media library series.

use std::collections::BTreeMap;

use rusqlite::params;

use tunersched_protocol::{KnownEpisode, KnownSeries, Recording};

use super::{Database, Result};

impl Database {
    pub fn insert_recording(&self, recording: &Recording) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO recordings (channel_id, title, start_time, end_time) VALUES (?1, ?2, ?3, ?4)",
            params![
                recording.channel_id,
                recording.title,
                recording.start,
                recording.end
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Recordings whose title equals `name` (case-insensitive).
    pub fn get_recordings_by_name(&self, name: &str) -> Result<Vec<Recording>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, channel_id, title, start_time, end_time FROM recordings
             WHERE title = ?1 COLLATE NOCASE ORDER BY start_time",
        )?;
        let recordings = stmt
            .query_map(params![name.trim()], |row| {
                Ok(Recording {
                    id: row.get(0)?,
                    channel_id: row.get(1)?,
                    title: row.get(2)?,
                    start: row.get(3)?,
                    end: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(recordings)
    }

    /// Record a known episode, creating the series on first use.
    pub fn insert_known_episode(&self, series_name: &str, episode: &KnownEpisode) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO series (name) VALUES (?1)",
            params![series_name],
        )?;
        let series_id: i64 = self.conn.query_row(
            "SELECT id FROM series WHERE name = ?1",
            params![series_name],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO series_episodes (series_id, season_number, episode_number, episode_title)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                series_id,
                episode.season_number,
                episode.episode_number,
                episode.episode_title
            ],
        )?;
        Ok(())
    }

    pub fn get_known_series(&self) -> Result<Vec<KnownSeries>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.name, e.season_number, e.episode_number, e.episode_title
             FROM series s LEFT JOIN series_episodes e ON e.series_id = s.id
             ORDER BY s.name, e.season_number, e.episode_number",
        )?;

        let mut series: BTreeMap<String, Vec<KnownEpisode>> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<u32>>(1)?,
                row.get::<_, Option<u32>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        for row in rows {
            let (name, season_number, episode_number, episode_title) = row?;
            let episodes = series.entry(name).or_default();
            if season_number.is_some() || episode_number.is_some() || episode_title.is_some() {
                episodes.push(KnownEpisode {
                    season_number,
                    episode_number,
                    episode_title,
                });
            }
        }

        Ok(series
            .into_iter()
            .map(|(name, episodes)| KnownSeries { name, episodes })
            .collect())
    }
}

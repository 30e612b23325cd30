//! Channel and channel group CRUD operations.

use std::collections::HashMap;

use rusqlite::params;

use tunersched_protocol::{Channel, ChannelGroup, ChannelGroupId, ChannelId};

use super::{Database, Result};

impl Database {
    /// Insert a channel together with its group memberships.
    pub fn insert_channel(&self, channel: &Channel) -> Result<ChannelId> {
        self.conn
            .execute("INSERT INTO channels (name) VALUES (?1)", params![channel.name])?;
        let id = self.conn.last_insert_rowid();

        for group_id in &channel.group_ids {
            self.add_channel_to_group(*group_id, id)?;
        }

        Ok(id)
    }

    /// Get or create a channel group by name.
    pub fn get_or_create_channel_group(&self, name: &str) -> Result<ChannelGroupId> {
        self.conn.execute(
            "INSERT OR IGNORE INTO channel_groups (name) VALUES (?1)",
            params![name],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM channel_groups WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn add_channel_to_group(&self, group_id: ChannelGroupId, channel_id: ChannelId) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO channel_group_members (group_id, channel_id) VALUES (?1, ?2)",
            params![group_id, channel_id],
        )?;
        Ok(())
    }

    /// Get all channels with their group memberships.
    pub fn get_all_channels(&self) -> Result<Vec<Channel>> {
        let mut memberships: HashMap<ChannelId, Vec<ChannelGroupId>> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT channel_id, group_id FROM channel_group_members ORDER BY group_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, ChannelId>(0)?, row.get::<_, ChannelGroupId>(1)?))
            })?;
            for row in rows {
                let (channel_id, group_id) = row?;
                memberships.entry(channel_id).or_default().push(group_id);
            }
        }

        let mut stmt = self.conn.prepare("SELECT id, name FROM channels ORDER BY id")?;
        let channels = stmt
            .query_map([], |row| {
                Ok(Channel {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    group_ids: Vec::new(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(channels
            .into_iter()
            .map(|mut channel| {
                channel.group_ids = memberships.remove(&channel.id).unwrap_or_default();
                channel
            })
            .collect())
    }

    pub fn get_all_channel_groups(&self) -> Result<Vec<ChannelGroup>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM channel_groups ORDER BY id")?;
        let groups = stmt
            .query_map([], |row| {
                Ok(ChannelGroup {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(groups)
    }
}

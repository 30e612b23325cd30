//! Card and tuning detail CRUD operations.

use rusqlite::{params, Row};

use tunersched_protocol::{Card, CardId, ChannelId, Transmitter, TuningDetail};

use super::{Database, DatabaseError, Result};

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        name: row.get(1)?,
        priority: row.get(2)?,
        decrypt_limit: row.get(3)?,
        supports_sub_channels: row.get::<_, i32>(4)? != 0,
        enabled: row.get::<_, i32>(5)? != 0,
    })
}

impl Database {
    /// Insert a new card and return its id.
    pub fn insert_card(&self, card: &Card) -> Result<CardId> {
        self.conn.execute(
            "INSERT INTO cards (name, priority, decrypt_limit, supports_sub_channels, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                card.name,
                card.priority,
                card.decrypt_limit,
                card.supports_sub_channels as i32,
                card.enabled as i32
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get all cards in insertion order.
    pub fn get_all_cards(&self) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, priority, decrypt_limit, supports_sub_channels, enabled
             FROM cards ORDER BY id",
        )?;

        let cards = stmt
            .query_map([], card_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(cards)
    }

    /// Enable or disable a card.
    pub fn set_card_enabled(&self, id: CardId, enabled: bool) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE cards SET enabled = ?1 WHERE id = ?2",
            params![enabled as i32, id],
        )?;
        Ok(changed > 0)
    }

    /// Insert or replace the tuning detail of a channel on a card.
    pub fn upsert_tuning_detail(&self, card_id: CardId, detail: &TuningDetail) -> Result<i64> {
        let transmitter = serde_json::to_string(&detail.transmitter)?;
        self.conn.execute(
            "INSERT INTO tuning_details (card_id, channel_id, name, is_encrypted, transmitter)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(card_id, channel_id) DO UPDATE SET
                name = excluded.name,
                is_encrypted = excluded.is_encrypted,
                transmitter = excluded.transmitter",
            params![
                card_id,
                detail.channel_id,
                detail.name,
                detail.is_encrypted as i32,
                transmitter
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM tuning_details WHERE card_id = ?1 AND channel_id = ?2",
            params![card_id, detail.channel_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Get the tuning detail for a channel on a card.
    pub fn get_tuning_detail(
        &self,
        card_id: CardId,
        channel_id: ChannelId,
    ) -> Result<Option<TuningDetail>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, channel_id, name, is_encrypted, transmitter
             FROM tuning_details WHERE card_id = ?1 AND channel_id = ?2",
        )?;

        let result = stmt.query_row(params![card_id, channel_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, ChannelId>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i32>(3)? != 0,
                row.get::<_, String>(4)?,
            ))
        });

        match result {
            Ok((id, channel_id, name, is_encrypted, transmitter)) => {
                let transmitter: Transmitter = serde_json::from_str(&transmitter)?;
                Ok(Some(TuningDetail {
                    id,
                    channel_id,
                    name: name.unwrap_or_default(),
                    is_encrypted,
                    transmitter,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::Sqlite(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunersched_protocol::Channel;

    #[test]
    fn test_card_round_trip_keeps_flags() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .insert_card(&Card::new(0, "DVB-C #1", 10).with_decrypt_limit(1).with_sub_channels())
            .unwrap();

        let cards = db.get_all_cards().unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, id);
        assert_eq!(cards[0].decrypt_limit, 1);
        assert!(cards[0].supports_sub_channels);

        assert!(db.set_card_enabled(id, false).unwrap());
        assert!(!db.get_all_cards().unwrap()[0].enabled);
    }

    #[test]
    fn test_tuning_detail_absent_and_upsert() {
        let db = Database::open_in_memory().unwrap();
        let card = db.insert_card(&Card::new(0, "Card", 1)).unwrap();
        let channel = db.insert_channel(&Channel::new(0, "One")).unwrap();

        assert!(db.get_tuning_detail(card, channel).unwrap().is_none());

        let mut detail = TuningDetail {
            id: 0,
            channel_id: channel,
            name: "One".into(),
            is_encrypted: false,
            transmitter: Transmitter::DvbC { frequency: 346_000, modulation: 64, symbol_rate: 6900 },
        };
        let first = db.upsert_tuning_detail(card, &detail).unwrap();

        detail.is_encrypted = true;
        let second = db.upsert_tuning_detail(card, &detail).unwrap();
        assert_eq!(first, second);

        let loaded = db.get_tuning_detail(card, channel).unwrap().unwrap();
        assert!(loaded.is_encrypted);
        assert_eq!(loaded.transmitter, detail.transmitter);
    }
}

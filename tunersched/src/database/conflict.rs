//! Conflict set storage.

use rusqlite::params;

use tunersched_protocol::Conflict;

use super::{Database, Result};

impl Database {
    /// Replace the stored conflict set in one transaction.
    ///
    /// On error nothing is committed and the previous set stays in place.
    pub fn replace_conflicts(&mut self, conflicts: &[Conflict]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM conflicts", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO conflicts (card_id, channel_id, schedule_id, conflicting_schedule_id,
                                        program_start_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for conflict in conflicts {
                stmt.execute(params![
                    conflict.card_id,
                    conflict.channel_id,
                    conflict.schedule_id,
                    conflict.conflicting_schedule_id,
                    conflict.program_start_time
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_all_conflicts(&self) -> Result<Vec<Conflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_id, channel_id, schedule_id, conflicting_schedule_id, program_start_time
             FROM conflicts ORDER BY program_start_time, id",
        )?;
        let conflicts = stmt
            .query_map([], |row| {
                Ok(Conflict {
                    id: row.get(0)?,
                    card_id: row.get(1)?,
                    channel_id: row.get(2)?,
                    schedule_id: row.get(3)?,
                    conflicting_schedule_id: row.get(4)?,
                    program_start_time: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn conflict(schedule_id: i64, conflicting: Option<i64>) -> Conflict {
        Conflict {
            id: 0,
            card_id: conflicting.map(|_| 1),
            channel_id: 7,
            schedule_id,
            conflicting_schedule_id: conflicting,
            program_start_time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(20, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_replace_conflicts_is_wholesale() {
        let mut db = Database::open_in_memory().unwrap();
        db.replace_conflicts(&[conflict(1, Some(2)), conflict(3, None)])
            .unwrap();
        assert_eq!(db.get_all_conflicts().unwrap().len(), 2);

        db.replace_conflicts(&[conflict(4, Some(5))]).unwrap();
        let stored = db.get_all_conflicts().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].same_as(&conflict(4, Some(5))));
    }

    #[test]
    fn test_failed_replace_keeps_previous_set() {
        let mut db = Database::open_in_memory().unwrap();
        db.replace_conflicts(&[conflict(1, Some(2))]).unwrap();

        // Make the insert fail halfway through the transaction.
        db.connection()
            .execute_batch(
                "CREATE TRIGGER reject_conflict BEFORE INSERT ON conflicts
                 WHEN NEW.schedule_id = 99
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        assert!(db
            .replace_conflicts(&[conflict(8, Some(9)), conflict(99, None)])
            .is_err());

        let stored = db.get_all_conflicts().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].schedule_id, 1);
    }
}

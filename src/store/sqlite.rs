//! [`RewardStore`] implementation over SQLite

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{InsertOutcome, LeaderboardEntry, RewardStore, SqliteStore, StoreError};
use crate::domain::{Device, DeviceId, DeviceStats, LedgerEntry, RawEvent, RewardSource};
use crate::rewards::quests::{ProgressMap, QuestId, QuestProgress};
use crate::time_bucket::{day_bucket, format_day, from_millis, parse_day};

fn device_id_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DeviceId> {
    let raw: String = row.get(idx)?;
    DeviceId::parse(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn stats_from_row(row: &Row<'_>) -> rusqlite::Result<(DeviceStats, String)> {
    let last_session: Option<String> = row.get(4)?;
    let stats = DeviceStats {
        total_xp: row.get(0)?,
        level: row.get(1)?,
        current_streak: row.get(2)?,
        longest_streak: row.get(3)?,
        last_session_date: last_session.as_deref().and_then(parse_day),
        total_commits: row.get(5)?,
        total_test_passes: row.get(6)?,
        total_branches: row.get(7)?,
        total_prs: row.get(8)?,
        total_merged_prs: row.get(9)?,
        total_insertions: row.get(10)?,
        total_sessions: row.get(11)?,
        total_session_minutes: row.get(12)?,
        file_extensions: BTreeSet::new(),
    };
    Ok((stats, row.get(13)?))
}

fn write_stats(
    conn: &Connection,
    device_id: &DeviceId,
    stats: &DeviceStats,
) -> Result<(), StoreError> {
    let extensions = serde_json::to_string(&stats.file_extensions)
        .map_err(|e| StoreError::Corrupt(format!("file_extensions: {e}")))?;
    let last_session = stats.last_session_date.map(format_day);

    conn.execute(
        r#"INSERT INTO user_stats
           (device_id, total_xp, level, current_streak, longest_streak, last_session_date,
            total_commits, total_test_passes, total_branches, total_prs, total_merged_prs,
            total_insertions, total_sessions, total_session_minutes, file_extensions)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
           ON CONFLICT(device_id) DO UPDATE SET
               total_xp = excluded.total_xp,
               level = excluded.level,
               current_streak = excluded.current_streak,
               longest_streak = excluded.longest_streak,
               last_session_date = excluded.last_session_date,
               total_commits = excluded.total_commits,
               total_test_passes = excluded.total_test_passes,
               total_branches = excluded.total_branches,
               total_prs = excluded.total_prs,
               total_merged_prs = excluded.total_merged_prs,
               total_insertions = excluded.total_insertions,
               total_sessions = excluded.total_sessions,
               total_session_minutes = excluded.total_session_minutes,
               file_extensions = excluded.file_extensions"#,
        params![
            device_id.as_str(),
            stats.total_xp,
            stats.level,
            stats.current_streak,
            stats.longest_streak,
            last_session,
            stats.total_commits,
            stats.total_test_passes,
            stats.total_branches,
            stats.total_prs,
            stats.total_merged_prs,
            stats.total_insertions,
            stats.total_sessions,
            stats.total_session_minutes,
            extensions,
        ],
    )?;
    Ok(())
}

fn write_quest_progress(
    conn: &Connection,
    device_id: &DeviceId,
    progress: &QuestProgress,
) -> Result<(), StoreError> {
    conn.execute(
        r#"INSERT INTO quest_progress (device_id, quest_id, current_value, reset_on, completed_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(device_id, quest_id) DO UPDATE SET
               current_value = excluded.current_value,
               reset_on = excluded.reset_on,
               completed_at = excluded.completed_at"#,
        params![
            device_id.as_str(),
            progress.quest_id.as_str(),
            progress.current_value,
            progress.reset_on.map(format_day),
            progress.completed_at.map(|at| at.timestamp_millis()),
        ],
    )?;
    Ok(())
}

fn write_ledger(conn: &Connection, entry: &LedgerEntry) -> Result<(), StoreError> {
    let created_at = entry.created_at.timestamp_millis();
    conn.execute(
        r#"INSERT INTO xp_ledger (device_id, source, amount, created_at, day_bucket)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
        params![
            entry.device_id.as_str(),
            entry.source.as_str(),
            entry.amount,
            created_at,
            day_bucket(created_at),
        ],
    )?;
    Ok(())
}

impl RewardStore for SqliteStore {
    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn mark_processed(
        &self,
        fingerprint: &str,
        device_id: &DeviceId,
        at: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO processed_events (fingerprint, device_id, processed_at) VALUES (?1, ?2, ?3)",
            params![fingerprint, device_id.as_str(), at.timestamp_millis()],
        );
        match result.map_err(StoreError::from) {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if e.is_constraint_violation() => Ok(InsertOutcome::AlreadyPresent),
            Err(e) => Err(e),
        }
    }

    fn get_device(&self, device_id: &DeviceId) -> Result<Option<Device>, StoreError> {
        let conn = self.conn()?;
        let device = conn
            .query_row(
                "SELECT id, character_name, created_at, show_on_leaderboard FROM devices WHERE id = ?1",
                [device_id.as_str()],
                |row| {
                    Ok(Device {
                        id: device_id_column(row, 0)?,
                        character_name: row.get(1)?,
                        created_at: from_millis(row.get(2)?),
                        show_on_leaderboard: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(device)
    }

    fn insert_device(&self, device: &Device) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"INSERT OR IGNORE INTO devices (id, character_name, created_at, show_on_leaderboard)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                device.id.as_str(),
                device.character_name,
                device.created_at.timestamp_millis(),
                device.show_on_leaderboard,
            ],
        )?;
        Ok(if inserted == 0 {
            InsertOutcome::AlreadyPresent
        } else {
            InsertOutcome::Inserted
        })
    }

    fn update_device(&self, device: &Device) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE devices SET character_name = ?2, show_on_leaderboard = ?3 WHERE id = ?1",
            params![device.id.as_str(), device.character_name, device.show_on_leaderboard],
        )?;
        Ok(())
    }

    fn delete_device(&self, device_id: &DeviceId) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM devices WHERE id = ?1", [device_id.as_str()])?;
        Ok(deleted > 0)
    }

    fn load_stats(&self, device_id: &DeviceId) -> Result<Option<DeviceStats>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"SELECT total_xp, level, current_streak, longest_streak, last_session_date,
                          total_commits, total_test_passes, total_branches, total_prs,
                          total_merged_prs, total_insertions, total_sessions,
                          total_session_minutes, file_extensions
                   FROM user_stats WHERE device_id = ?1"#,
                [device_id.as_str()],
                stats_from_row,
            )
            .optional()?;

        let Some((mut stats, extensions)) = row else {
            return Ok(None);
        };
        stats.file_extensions = serde_json::from_str(&extensions)
            .map_err(|e| StoreError::Corrupt(format!("file_extensions: {e}")))?;
        Ok(Some(stats))
    }

    fn save_stats(&self, device_id: &DeviceId, stats: &DeviceStats) -> Result<(), StoreError> {
        let conn = self.conn()?;
        write_stats(&conn, device_id, stats)
    }

    fn load_quest_progress(&self, device_id: &DeviceId) -> Result<ProgressMap, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT quest_id, current_value, reset_on, completed_at
               FROM quest_progress WHERE device_id = ?1"#,
        )?;
        let rows = stmt.query_map([device_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;

        let mut progress = ProgressMap::new();
        for row in rows {
            let (quest_id, current_value, reset_on, completed_at) = row?;
            // Rows for retired quests are kept but ignored
            let Some(quest_id) = QuestId::from_str(&quest_id) else {
                tracing::debug!("[questhook:store] Ignoring unknown quest {}", quest_id);
                continue;
            };
            progress.insert(
                quest_id,
                QuestProgress {
                    quest_id,
                    current_value,
                    reset_on: reset_on.as_deref().and_then(parse_day),
                    completed_at: completed_at.map(from_millis),
                },
            );
        }
        Ok(progress)
    }

    fn save_quest_progress(
        &self,
        device_id: &DeviceId,
        progress: &QuestProgress,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        write_quest_progress(&conn, device_id, progress)
    }

    fn append_ledger(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let conn = self.conn()?;
        write_ledger(&conn, entry)
    }

    fn commit_rewards(
        &self,
        device_id: &DeviceId,
        stats: &DeviceStats,
        ledger: &[LedgerEntry],
        progress: &[QuestProgress],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for entry in ledger {
            write_ledger(&tx, entry)?;
        }
        for row in progress {
            write_quest_progress(&tx, device_id, row)?;
        }
        write_stats(&tx, device_id, stats)?;
        tx.commit()?;
        Ok(())
    }

    fn count_ledger_since(
        &self,
        device_id: &DeviceId,
        source: Option<RewardSource>,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let conn = self.conn()?;
        let count = conn.query_row(
            r#"SELECT COUNT(*) FROM xp_ledger
               WHERE device_id = ?1 AND created_at >= ?2 AND (?3 IS NULL OR source = ?3)"#,
            params![
                device_id.as_str(),
                since.timestamp_millis(),
                source.map(|s| s.as_str()),
            ],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    fn ledger_since(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT source, amount, created_at FROM xp_ledger
               WHERE device_id = ?1 AND created_at >= ?2
               ORDER BY created_at, id"#,
        )?;
        let rows = stmt.query_map(params![device_id.as_str(), since.timestamp_millis()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (source, amount, created_at) = row?;
            let source = RewardSource::from_str(&source)
                .ok_or_else(|| StoreError::Corrupt(format!("ledger source {source:?}")))?;
            entries.push(LedgerEntry::new(device_id, source, amount, from_millis(created_at)));
        }
        Ok(entries)
    }

    fn append_raw_event(&self, event: &RawEvent) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO raw_events (device_id, session_id, event_kind, payload, received_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                event.device_id.as_str(),
                event.session_id,
                event.event_kind,
                event.payload.to_string(),
                event.received_at.timestamp_millis(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn raw_events_page(
        &self,
        device_id: &DeviceId,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<RawEvent>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, session_id, event_kind, payload, received_at FROM raw_events
               WHERE device_id = ?1 AND id > ?2
               ORDER BY id LIMIT ?3"#,
        )?;
        let rows = stmt.query_map(params![device_id.as_str(), after_id, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, session_id, event_kind, payload, received_at) = row?;
            let payload = serde_json::from_str(&payload)
                .map_err(|e| StoreError::Corrupt(format!("raw event {id}: {e}")))?;
            events.push(RawEvent {
                id,
                device_id: device_id.clone(),
                session_id,
                event_kind,
                payload,
                received_at: from_millis(received_at),
            });
        }
        Ok(events)
    }

    fn session_started_at(
        &self,
        device_id: &DeviceId,
        session_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn()?;
        let started: Option<i64> = conn.query_row(
            r#"SELECT MIN(received_at) FROM raw_events
               WHERE device_id = ?1 AND session_id = ?2 AND event_kind = 'SessionStart'"#,
            params![device_id.as_str(), session_id],
            |r| r.get(0),
        )?;
        Ok(started.map(from_millis))
    }

    fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT d.character_name, s.level, s.total_xp, s.current_streak
               FROM user_stats s JOIN devices d ON d.id = s.device_id
               WHERE d.show_on_leaderboard = 1
               ORDER BY s.total_xp DESC, d.created_at ASC
               LIMIT ?1"#,
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(LeaderboardEntry {
                character_name: row.get(0)?,
                level: row.get(1)?,
                total_xp: row.get(2)?,
                current_streak: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

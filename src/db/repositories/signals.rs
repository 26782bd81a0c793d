use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, parse_level, to_sql_error},
    models::{SignalLevel, SignalPair, SignalRecord},
    Database,
};

fn row_to_signal_record(row: &Row) -> Result<SignalRecord, rusqlite::Error> {
    let level = parse_level(row.get("level")?).map_err(to_sql_error)?;
    let timestamp: String = row.get("transition_timestamp")?;

    Ok(SignalRecord {
        level,
        duration_since_last_transition: row
            .get::<_, Option<f64>>("duration_since_last_transition")?
            .unwrap_or(0.0),
        transition_timestamp: parse_datetime(&timestamp, "transition_timestamp")
            .map_err(to_sql_error)?,
    })
}

fn select_signal(
    conn: &rusqlite::Connection,
    level: SignalLevel,
) -> Result<Option<SignalRecord>> {
    let record = conn
        .query_row(
            "SELECT level, duration_since_last_transition, transition_timestamp
             FROM conveyor_signal
             WHERE level = ?1",
            params![level.as_i64()],
            row_to_signal_record,
        )
        .optional()
        .with_context(|| format!("failed to read {level} signal record"))?;
    Ok(record)
}

impl Database {
    /// Creates any missing level row with a zero duration. Existing rows
    /// are left untouched.
    pub async fn initialize_signals(&self, now: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open signal initialization transaction")?;
            let mut created = 0;
            for level in SignalLevel::ALL {
                created += tx
                    .execute(
                        "INSERT OR IGNORE INTO conveyor_signal
                             (level, duration_since_last_transition, transition_timestamp)
                         VALUES (?1, 0, ?2)",
                        params![level.as_i64(), now.to_rfc3339()],
                    )
                    .with_context(|| format!("failed to initialize {level} signal record"))?;
            }
            tx.commit()
                .context("failed to commit signal initialization")?;
            Ok(created)
        })
        .await
    }

    /// Overwrites the row for `record.level` in a single statement.
    pub async fn write_signal(&self, record: &SignalRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO conveyor_signal
                     (level, duration_since_last_transition, transition_timestamp)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(level) DO UPDATE SET
                     duration_since_last_transition = excluded.duration_since_last_transition,
                     transition_timestamp = excluded.transition_timestamp",
                params![
                    record.level.as_i64(),
                    record.duration_since_last_transition,
                    record.transition_timestamp.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to write {} signal record", record.level))?;
            Ok(())
        })
        .await
    }

    pub async fn read_signal(&self, level: SignalLevel) -> Result<Option<SignalRecord>> {
        self.execute(move |conn| select_signal(conn, level)).await
    }

    /// Reads both rows in one read transaction. A missing row comes back
    /// as [`SignalRecord::uninitialized`].
    pub async fn read_signal_pair(&self) -> Result<SignalPair> {
        self.execute(|conn| {
            let tx = conn
                .transaction()
                .context("failed to open signal read transaction")?;
            let on = select_signal(&tx, SignalLevel::On)?
                .unwrap_or_else(|| SignalRecord::uninitialized(SignalLevel::On));
            let off = select_signal(&tx, SignalLevel::Off)?
                .unwrap_or_else(|| SignalRecord::uninitialized(SignalLevel::Off));
            tx.finish().context("failed to close signal read transaction")?;
            Ok(SignalPair { on, off })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn open_store() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("signal.sqlite")).unwrap();
        (dir, db)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[tokio::test]
    async fn initialization_creates_both_rows_once() {
        let (_dir, db) = open_store();

        assert_eq!(db.initialize_signals(at(0)).await.unwrap(), 2);
        assert_eq!(db.initialize_signals(at(60)).await.unwrap(), 0);

        let pair = db.read_signal_pair().await.unwrap();
        assert_eq!(pair.on, SignalRecord::new(SignalLevel::On, 0.0, at(0)));
        assert_eq!(pair.off, SignalRecord::new(SignalLevel::Off, 0.0, at(0)));
    }

    #[tokio::test]
    async fn initialization_keeps_existing_values() {
        let (_dir, db) = open_store();
        db.write_signal(&SignalRecord::new(SignalLevel::On, 12.5, at(5)))
            .await
            .unwrap();

        assert_eq!(db.initialize_signals(at(30)).await.unwrap(), 1);

        let on = db.read_signal(SignalLevel::On).await.unwrap().unwrap();
        assert_eq!(on.duration_since_last_transition, 12.5);
        assert_eq!(on.transition_timestamp, at(5));
    }

    #[tokio::test]
    async fn writes_overwrite_only_their_level() {
        let (_dir, db) = open_store();
        db.initialize_signals(at(0)).await.unwrap();

        db.write_signal(&SignalRecord::new(SignalLevel::Off, 14.0, at(20)))
            .await
            .unwrap();
        db.write_signal(&SignalRecord::new(SignalLevel::Off, 15.25, at(50)))
            .await
            .unwrap();

        let pair = db.read_signal_pair().await.unwrap();
        assert_eq!(pair.off, SignalRecord::new(SignalLevel::Off, 15.25, at(50)));
        assert_eq!(pair.on, SignalRecord::new(SignalLevel::On, 0.0, at(0)));
    }

    #[tokio::test]
    async fn missing_rows_read_as_uninitialized() {
        let (_dir, db) = open_store();

        assert!(db.read_signal(SignalLevel::On).await.unwrap().is_none());
        let pair = db.read_signal_pair().await.unwrap();
        assert_eq!(pair.on, SignalRecord::uninitialized(SignalLevel::On));
        assert_eq!(pair.off, SignalRecord::uninitialized(SignalLevel::Off));
    }

    #[tokio::test]
    async fn second_handle_sees_writes_from_first() {
        let (dir, writer) = open_store();
        writer.initialize_signals(at(0)).await.unwrap();
        let reader = Database::new(dir.path().join("signal.sqlite")).unwrap();

        writer
            .write_signal(&SignalRecord::new(SignalLevel::On, 11.0, at(11)))
            .await
            .unwrap();

        let on = reader.read_signal(SignalLevel::On).await.unwrap().unwrap();
        assert_eq!(on.duration_since_last_transition, 11.0);
    }
}

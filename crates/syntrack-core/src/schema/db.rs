use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::error::Result;
use crate::model::{AlignmentId, AlignmentRecord, RunId, RunRecord};

use super::migrations::MIGRATIONS;

const ALIGNMENT_COLUMNS: &str = "id, song_id, source, clip_name, clip_path, offset_secs,
    frame_index, winning_votes, clip_frames, params_tag, run_id, created_at";

const RUN_COLUMNS: &str = "id, mode, started_at, finished_at, succeeded, failed, aligned";

/// A database connection holding alignment results and run history.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }
}

// Alignments
impl Database {
    /// Insert an alignment, replacing any earlier result for the same clip
    /// and parameter tag.
    pub fn upsert_alignment(&self, record: &AlignmentRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO alignments (
                id, song_id, source, clip_name, clip_path, offset_secs,
                frame_index, winning_votes, clip_frames, params_tag, run_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (song_id, clip_name, params_tag) DO UPDATE SET
                source = excluded.source,
                clip_path = excluded.clip_path,
                offset_secs = excluded.offset_secs,
                frame_index = excluded.frame_index,
                winning_votes = excluded.winning_votes,
                clip_frames = excluded.clip_frames,
                run_id = excluded.run_id,
                created_at = excluded.created_at",
            rusqlite::params![
                record.id.to_string(),
                record.song_id,
                record.source,
                record.clip_name,
                record.clip_path,
                record.offset_secs,
                i64::try_from(record.frame_index).unwrap_or(i64::MAX),
                i64::from(record.winning_votes),
                i64::try_from(record.clip_frames).unwrap_or(i64::MAX),
                record.params_tag,
                record.run_id.map(|id| id.to_string()),
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// List stored alignments, optionally restricted to one song.
    pub fn list_alignments(&self, song_id: Option<&str>) -> Result<Vec<AlignmentRecord>> {
        let sql = format!(
            "SELECT {ALIGNMENT_COLUMNS} FROM alignments
             WHERE ?1 IS NULL OR song_id = ?1
             ORDER BY song_id, clip_name, params_tag"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([song_id], row_to_alignment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Fetch the alignment for one clip under one parameter tag.
    pub fn get_alignment(
        &self,
        song_id: &str,
        clip_name: &str,
        params_tag: &str,
    ) -> Result<Option<AlignmentRecord>> {
        let sql = format!(
            "SELECT {ALIGNMENT_COLUMNS} FROM alignments
             WHERE song_id = ?1 AND clip_name = ?2 AND params_tag = ?3"
        );
        let record = self
            .conn
            .query_row(&sql, [song_id, clip_name, params_tag], row_to_alignment)
            .optional()?;
        Ok(record)
    }
}

// Runs
impl Database {
    /// Insert a run, or update its counters if it already exists.
    pub fn save_run(&self, run: &RunRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO runs (id, mode, started_at, finished_at, succeeded, failed, aligned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                finished_at = excluded.finished_at,
                succeeded = excluded.succeeded,
                failed = excluded.failed,
                aligned = excluded.aligned",
            rusqlite::params![
                run.id.to_string(),
                run.mode,
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
                i64::try_from(run.succeeded).unwrap_or(i64::MAX),
                i64::try_from(run.failed).unwrap_or(i64::MAX),
                i64::try_from(run.aligned).unwrap_or(i64::MAX),
            ],
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY started_at DESC LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map([i64::try_from(limit).unwrap_or(i64::MAX)], row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn timestamp_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn count_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<usize> {
    let raw: i64 = row.get(idx)?;
    usize::try_from(raw).map_err(|e| conversion_error(idx, e))
}

fn row_to_alignment(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlignmentRecord> {
    let id: String = row.get(0)?;
    let run_id: Option<String> = row.get(10)?;
    let winning_votes: i64 = row.get(7)?;

    Ok(AlignmentRecord {
        id: AlignmentId::parse(&id).map_err(|e| conversion_error(0, e))?,
        song_id: row.get(1)?,
        source: row.get(2)?,
        clip_name: row.get(3)?,
        clip_path: row.get(4)?,
        offset_secs: row.get(5)?,
        frame_index: count_at(row, 6)?,
        winning_votes: u32::try_from(winning_votes).map_err(|e| conversion_error(7, e))?,
        clip_frames: count_at(row, 8)?,
        params_tag: row.get(9)?,
        run_id: run_id
            .map(|s| RunId::parse(&s).map_err(|e| conversion_error(10, e)))
            .transpose()?,
        created_at: timestamp_at(row, 11)?,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    let id: String = row.get(0)?;
    let finished_at: Option<String> = row.get(3)?;

    Ok(RunRecord {
        id: RunId::parse(&id).map_err(|e| conversion_error(0, e))?,
        mode: row.get(1)?,
        started_at: timestamp_at(row, 2)?,
        finished_at: finished_at
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| conversion_error(3, e))
            })
            .transpose()?,
        succeeded: count_at(row, 4)?,
        failed: count_at(row, 5)?,
        aligned: count_at(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlignmentResult, Clip, SongId};
    use std::path::PathBuf;

    fn clip(name: &str) -> Clip {
        Clip {
            song: SongId::new("clocks_coldplay"),
            source: "youtube".to_string(),
            name: name.to_string(),
            index: 1,
            subfolder: None,
            path: PathBuf::from(format!("/catalog/clocks_coldplay/clips_youtube/{name}.mp4")),
        }
    }

    fn result(offset_secs: f64, frame_index: usize) -> AlignmentResult {
        let mut votes = vec![0; frame_index + 1];
        votes[frame_index] = 5;
        AlignmentResult {
            offset_secs,
            frame_index,
            votes,
            clip_frames: 8,
        }
    }

    #[test]
    fn test_database_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reopen_does_not_reapply_migrations() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("results.db");
        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_alignment_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let run = RunRecord::start("all");
        db.save_run(&run).unwrap();

        let record = AlignmentRecord::new(&clip("clip01"), &result(4.2, 42), "tag").with_run(run.id);
        db.upsert_alignment(&record).unwrap();

        let stored = db
            .get_alignment("clocks_coldplay", "youtube/clip01", "tag")
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, record.id);
        assert_eq!(stored.frame_index, 42);
        assert_eq!(stored.winning_votes, 5);
        assert_eq!(stored.run_id, Some(run.id));
        assert!((stored.offset_secs - 4.2).abs() < 1e-12);
        assert!((stored.confidence() - 5.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_upsert_replaces_previous_result() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_alignment(&AlignmentRecord::new(&clip("clip01"), &result(4.2, 42), "tag"))
            .unwrap();
        db.upsert_alignment(&AlignmentRecord::new(&clip("clip01"), &result(7.0, 70), "tag"))
            .unwrap();
        db.upsert_alignment(&AlignmentRecord::new(&clip("clip01"), &result(1.0, 10), "other"))
            .unwrap();

        let all = db.list_alignments(None).unwrap();
        assert_eq!(all.len(), 2);
        let stored = db
            .get_alignment("clocks_coldplay", "youtube/clip01", "tag")
            .unwrap()
            .unwrap();
        assert_eq!(stored.frame_index, 70);
    }

    #[test]
    fn test_clips_with_underscored_sources_keep_separate_rows() {
        let db = Database::open_in_memory().unwrap();
        let mut nested = clip("clip01");
        nested.source = "yt".to_string();
        nested.subfolder = Some("live".to_string());
        let mut flat = clip("clip01");
        flat.source = "yt_live".to_string();

        db.upsert_alignment(&AlignmentRecord::new(&nested, &result(1.0, 10), "tag"))
            .unwrap();
        db.upsert_alignment(&AlignmentRecord::new(&flat, &result(3.0, 30), "tag"))
            .unwrap();

        assert_eq!(db.list_alignments(None).unwrap().len(), 2);
        let stored = db
            .get_alignment("clocks_coldplay", "yt/live/clip01", "tag")
            .unwrap()
            .unwrap();
        assert_eq!(stored.frame_index, 10);
    }

    #[test]
    fn test_list_alignments_by_song() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_alignment(&AlignmentRecord::new(&clip("clip01"), &result(4.2, 42), "tag"))
            .unwrap();
        assert_eq!(db.list_alignments(Some("clocks_coldplay")).unwrap().len(), 1);
        assert!(db.list_alignments(Some("other_song")).unwrap().is_empty());
    }

    #[test]
    fn test_run_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let run = RunRecord::start("clips-only");
        db.save_run(&run).unwrap();
        let finished = run.finish(5, 1, 4);
        db.save_run(&finished).unwrap();

        let runs = db.list_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].mode, "clips-only");
        assert_eq!(runs[0].failed, 1);
        assert_eq!(runs[0].aligned, 4);
        assert!(runs[0].finished_at.is_some());
    }
}

/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Batch runs
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    mode TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    succeeded INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    aligned INTEGER NOT NULL DEFAULT 0
);

-- Alignment results, one row per clip and parameter set
CREATE TABLE IF NOT EXISTS alignments (
    id TEXT PRIMARY KEY,
    song_id TEXT NOT NULL,
    source TEXT NOT NULL,
    clip_name TEXT NOT NULL,
    clip_path TEXT NOT NULL,
    offset_secs REAL NOT NULL,
    frame_index INTEGER NOT NULL,
    winning_votes INTEGER NOT NULL,
    clip_frames INTEGER NOT NULL,
    params_tag TEXT NOT NULL,
    run_id TEXT REFERENCES runs(id),
    created_at TEXT NOT NULL,
    UNIQUE (song_id, clip_name, params_tag)
);

CREATE INDEX IF NOT EXISTS idx_alignments_song_id ON alignments(song_id);
"#;

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: MIGRATION_001,
}];

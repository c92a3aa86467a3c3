//! Catalog schema migrations.
//!
//! Applied migrations are tracked in a `_migrations` table and pending ones
//! run in version order. `ADD COLUMN` migrations are skipped when the column
//! already exists so that a partially migrated file can be reopened.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly.
    Standard,
    /// ALTER TABLE ADD COLUMN, skipped if the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_recordings_table",
        sql: include_str!("sql/001_create_recordings.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_transcripts_table",
        sql: include_str!("sql/002_create_transcripts.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_enrichments_table",
        sql: include_str!("sql/003_create_enrichments.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "add_phone_number_to_recordings",
        sql: include_str!("sql/004_add_phone_number.sql"),
        kind: MigrationKind::AddColumn {
            table: "recordings",
            column: "phone_number",
        },
    },
    Migration {
        version: 5,
        description: "add_caller_name_to_recordings",
        sql: include_str!("sql/005_add_caller_name.sql"),
        kind: MigrationKind::AddColumn {
            table: "recordings",
            column: "caller_name",
        },
    },
    Migration {
        version: 6,
        description: "add_call_datetime_to_recordings",
        sql: include_str!("sql/006_add_call_datetime.sql"),
        kind: MigrationKind::AddColumn {
            table: "recordings",
            column: "call_datetime",
        },
    },
    Migration {
        version: 7,
        description: "add_diarization_pending_to_enrichments",
        sql: include_str!("sql/007_add_diarization_pending.sql"),
        kind: MigrationKind::AddColumn {
            table: "enrichments",
            column: "diarization_pending",
        },
    },
    Migration {
        version: 8,
        description: "add_diarization_skip_reason_to_enrichments",
        sql: include_str!("sql/008_add_diarization_skip_reason.sql"),
        kind: MigrationKind::AddColumn {
            table: "enrichments",
            column: "diarization_skip_reason",
        },
    },
    Migration {
        version: 9,
        description: "add_processing_step_to_recordings",
        sql: include_str!("sql/009_add_processing_step.sql"),
        kind: MigrationKind::AddColumn {
            table: "recordings",
            column: "processing_step",
        },
    },
    Migration {
        version: 10,
        description: "add_processing_step_started_at_to_recordings",
        sql: include_str!("sql/010_add_processing_step_started_at.sql"),
        kind: MigrationKind::AddColumn {
            table: "recordings",
            column: "processing_step_started_at",
        },
    },
    Migration {
        version: 11,
        description: "add_processing_segments_count_to_recordings",
        sql: include_str!("sql/011_add_processing_segments_count.sql"),
        kind: MigrationKind::AddColumn {
            table: "recordings",
            column: "processing_segments_count",
        },
    },
    Migration {
        version: 12,
        description: "create_status_updated_index",
        sql: include_str!("sql/012_create_dispatch_index.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 13,
        description: "add_claim_token_to_recordings",
        sql: include_str!("sql/013_add_claim_token.sql"),
        kind: MigrationKind::AddColumn {
            table: "recordings",
            column: "claim_token",
        },
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let should_run = match &migration.kind {
            MigrationKind::Standard => true,
            MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
        };

        if should_run {
            conn.execute_batch(migration.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        } else {
            log::info!("Skipping migration v{} (column present)", migration.version);
        }

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}

//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                display_name TEXT,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                onboarded INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS daily_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES profiles(user_id),
                date TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, date)
            );
            CREATE INDEX IF NOT EXISTS idx_daily_logs_user ON daily_logs(user_id);

            CREATE TABLE IF NOT EXISTS sequences (
                key TEXT PRIMARY KEY,
                display_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sequence_progress (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                sequence_key TEXT NOT NULL REFERENCES sequences(key),
                daily_log_id TEXT REFERENCES daily_logs(id),
                current_step TEXT NOT NULL,
                responses TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'not_started',
                started_at TEXT NOT NULL DEFAULT (datetime('now')),
                completed_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_progress_daily
                ON sequence_progress(user_id, sequence_key, daily_log_id)
                WHERE daily_log_id IS NOT NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_progress_dayless
                ON sequence_progress(user_id, sequence_key)
                WHERE daily_log_id IS NULL;

            CREATE TABLE IF NOT EXISTS metrics (
                name TEXT PRIMARY KEY,
                value_type TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metric_responses (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                daily_log_id TEXT NOT NULL REFERENCES daily_logs(id),
                metric_name TEXT NOT NULL REFERENCES metrics(name),
                value TEXT NOT NULL,
                recorded_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, daily_log_id, metric_name)
            );
            CREATE INDEX IF NOT EXISTS idx_metric_responses_user_metric
                ON metric_responses(user_id, metric_name, recorded_at);

            CREATE TABLE IF NOT EXISTS page_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                step_key TEXT NOT NULL,
                daily_log_id TEXT,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_page_events_user_step
                ON page_events(user_id, step_key);
            CREATE INDEX IF NOT EXISTS idx_page_events_daily_log
                ON page_events(daily_log_id);
        "#,
    },
    Migration {
        version: 2,
        name: "seed_catalogs",
        sql: r#"
            INSERT OR IGNORE INTO sequences (key, display_name) VALUES
                ('onboarding', 'Onboarding'),
                ('morning', 'Morning'),
                ('evening', 'Evening');

            INSERT OR IGNORE INTO metrics (name, value_type) VALUES
                ('display_name', 'text'),
                ('timezone', 'text'),
                ('evening_reflection_time', 'time'),
                ('sleep_quality', 'scale'),
                ('mood_score', 'scale'),
                ('intention', 'text'),
                ('audio_progress', 'integer'),
                ('day_score', 'scale'),
                ('gratitude', 'text'),
                ('worked_today', 'text'),
                ('work_reflection', 'text'),
                ('working_tomorrow', 'text'),
                ('return_date', 'date'),
                ('day_off_override', 'boolean');
        "#,
    },
];

/// Apply all migrations newer than the recorded schema version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("creating _migrations table: {e}")))?;

    let current = current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| {
                DatabaseError::Migration(format!(
                    "migration {} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| {
            DatabaseError::Migration(format!(
                "recording migration {}: {e}",
                migration.version
            ))
        })?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied migration"
        );
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("reading schema version: {e}")))?;
    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("reading schema version: {e}")))?;
    match row {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Migration(format!("decoding schema version: {e}"))),
        None => Ok(0),
    }
}

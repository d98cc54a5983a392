//! SQL schema for the ledger database.
//!
//! Executed on every open. `PRAGMA user_version` records the layout so later
//! migrations can be gated on it.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per identity, ever. Rows are updated in place, never deleted.
CREATE TABLE IF NOT EXISTS ledger_entries (
    identity    TEXT PRIMARY KEY,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,   -- RFC 3339 UTC; set once
    updated_at  TEXT NOT NULL    -- RFC 3339 UTC
);

-- Append-only trail of every upsert.
CREATE TABLE IF NOT EXISTS ledger_history (
    history_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    identity        TEXT NOT NULL,
    action          TEXT NOT NULL,   -- 'created' | 'updated'
    previous_status TEXT,
    status          TEXT NOT NULL,
    recorded_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ledger_status_idx   ON ledger_entries(status);
CREATE INDEX IF NOT EXISTS history_identity_idx ON ledger_history(identity);

PRAGMA user_version = 1;
";

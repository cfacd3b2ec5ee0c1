/// SQL DDL for the westgard-store database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

/// Every table and index, idempotent.
pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS control_limits (
    analyte_id TEXT NOT NULL,
    lot_id TEXT NOT NULL,
    qc_level_id TEXT NOT NULL,
    machine_id TEXT NOT NULL,
    mean REAL NOT NULL,
    sd REAL NOT NULL,
    cv REAL,
    tea REAL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (analyte_id, lot_id, qc_level_id, machine_id)
);

CREATE TABLE IF NOT EXISTS qc_points (
    id TEXT PRIMARY KEY,
    analyte_id TEXT NOT NULL,
    lot_id TEXT NOT NULL,
    qc_level_id TEXT NOT NULL,
    machine_id TEXT NOT NULL,
    entry_date TEXT NOT NULL,
    value REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rules (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    config TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS violations (
    id TEXT PRIMARY KEY,
    analyte_id TEXT NOT NULL,
    lot_id TEXT NOT NULL,
    qc_level_id TEXT NOT NULL,
    machine_id TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    rule_code TEXT NOT NULL,
    point_id TEXT NOT NULL,
    entry_date TEXT NOT NULL,
    severity TEXT NOT NULL,
    explanation TEXT NOT NULL,
    z_score REAL NOT NULL,
    action TEXT,
    staff TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (analyte_id, lot_id, qc_level_id, machine_id, point_id, rule_id)
);

CREATE INDEX IF NOT EXISTS idx_points_context_date
    ON qc_points(analyte_id, lot_id, qc_level_id, machine_id, entry_date, id);
CREATE INDEX IF NOT EXISTS idx_violations_context_date
    ON violations(analyte_id, lot_id, qc_level_id, machine_id, entry_date);
CREATE INDEX IF NOT EXISTS idx_violations_point ON violations(point_id);
CREATE INDEX IF NOT EXISTS idx_violations_status ON violations(status);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
";

/// Connection pragmas.
pub const PRAGMAS: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
";

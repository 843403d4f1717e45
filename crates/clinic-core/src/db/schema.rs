//! SQLite schema definition.

/// Complete database schema for clinic records.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Identifier Sequences
-- ============================================================================

CREATE TABLE IF NOT EXISTS id_sequences (
    entity TEXT PRIMARY KEY,
    next_value INTEGER NOT NULL
);

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    external_id TEXT UNIQUE,                     -- insurance / national number
    name TEXT NOT NULL,
    date_of_birth TEXT,
    gender TEXT,
    phone TEXT,
    email TEXT,
    address TEXT,
    medical_history TEXT,                        -- free text
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'archived')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);
CREATE INDEX IF NOT EXISTS idx_patients_dob ON patients(date_of_birth);

-- ============================================================================
-- Visits
-- ============================================================================

CREATE TABLE IF NOT EXISTS visits (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    started_at TEXT NOT NULL,
    ended_at TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'closed')),
    doctor TEXT,
    reason TEXT,
    notes TEXT NOT NULL DEFAULT '',
    diagnosis TEXT,
    treatment TEXT,
    follow_up TEXT
);

CREATE INDEX IF NOT EXISTS idx_visits_patient ON visits(patient_id, started_at);

-- A patient has at most one active visit
CREATE UNIQUE INDEX IF NOT EXISTS idx_visits_one_active ON visits(patient_id)
WHERE status = 'active';

-- Closed visits stay closed
CREATE TRIGGER IF NOT EXISTS visits_closed_final BEFORE UPDATE ON visits
WHEN old.status = 'closed'
BEGIN
    SELECT RAISE(ABORT, 'Closed visits cannot be modified');
END;

CREATE TABLE IF NOT EXISTS medical_history (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    visit_id TEXT REFERENCES visits(id),
    recorded_at TEXT NOT NULL,
    kind TEXT NOT NULL,
    condition TEXT NOT NULL,
    notes TEXT,
    treatment TEXT
);

CREATE INDEX IF NOT EXISTS idx_medical_history_patient ON medical_history(patient_id, recorded_at);

-- ============================================================================
-- Appointments
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    scheduled_at TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
    doctor TEXT,
    reason TEXT,
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'scheduled' CHECK (status IN ('scheduled', 'completed', 'cancelled')),
    visit_id TEXT REFERENCES visits(id),
    cancel_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_appointments_scheduled ON appointments(scheduled_at);
CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id);
CREATE INDEX IF NOT EXISTS idx_appointments_doctor ON appointments(doctor, status);

-- Terminal appointments (completed / cancelled) are never modified
CREATE TRIGGER IF NOT EXISTS appointments_terminal_final BEFORE UPDATE ON appointments
WHEN old.status <> 'scheduled'
BEGIN
    SELECT RAISE(ABORT, 'Appointment is in a terminal state');
END;

-- ============================================================================
-- Documents
-- ============================================================================

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    visit_id TEXT REFERENCES visits(id),
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    description TEXT,
    file_name TEXT,
    file_size INTEGER,
    checksum TEXT,                               -- hex SHA-256 of stored file
    uploaded_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_patient ON documents(patient_id, uploaded_at);
CREATE INDEX IF NOT EXISTS idx_documents_visit ON documents(visit_id);

-- ============================================================================
-- Test Results (Append-Only - Immutable after creation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS test_results (
    id TEXT PRIMARY KEY,
    visit_id TEXT NOT NULL REFERENCES visits(id),
    patient_id TEXT NOT NULL REFERENCES patients(id),
    test_name TEXT NOT NULL,
    value TEXT NOT NULL,
    unit TEXT,
    reference_range TEXT,
    test_date TEXT NOT NULL,
    notes TEXT,
    supersedes TEXT UNIQUE REFERENCES test_results(id),  -- corrected record
    recorded_by TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_test_results_visit ON test_results(visit_id, recorded_at);
CREATE INDEX IF NOT EXISTS idx_test_results_patient ON test_results(patient_id, test_name);

CREATE TRIGGER IF NOT EXISTS test_results_no_update BEFORE UPDATE ON test_results
BEGIN
    SELECT RAISE(ABORT, 'Test results are append-only');
END;

CREATE TRIGGER IF NOT EXISTS test_results_no_delete BEFORE DELETE ON test_results
BEGIN
    SELECT RAISE(ABORT, 'Test results are append-only');
END;

-- ============================================================================
-- Users
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    role TEXT NOT NULL CHECK (role IN ('admin', 'staff')),
    password_hash TEXT NOT NULL,                 -- Argon2 PHC string
    failed_attempts INTEGER NOT NULL DEFAULT 0,
    locked_until TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ============================================================================
-- Audit Log (Append-Only - hash chained)
-- ============================================================================

CREATE TABLE IF NOT EXISTS audit_log (
    seq INTEGER PRIMARY KEY,
    entry_id TEXT NOT NULL UNIQUE,
    recorded_at TEXT NOT NULL,
    actor TEXT NOT NULL,
    operation TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    details TEXT,                                -- JSON
    prev_hash TEXT NOT NULL,
    hash TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'Audit log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'Audit log is append-only');
END;

-- ============================================================================
-- Settings
-- ============================================================================

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

//! Domain models for the clinic records system.

mod appointment;
mod audit;
mod document;
mod patient;
mod test_result;
mod user;
mod visit;

pub use appointment::*;
pub use audit::*;
pub use document::*;
pub use patient::*;
pub use test_result::*;
pub use user::*;
pub use visit::*;

/// Entity kinds that receive generated identifiers and audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Patient,
    Visit,
    Appointment,
    Document,
    TestResult,
    MedicalHistory,
    User,
    Settings,
    Backup,
}

impl EntityKind {
    /// Stable name used in the id sequence table and the audit log.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::Visit => "visit",
            EntityKind::Appointment => "appointment",
            EntityKind::Document => "document",
            EntityKind::TestResult => "test_result",
            EntityKind::MedicalHistory => "medical_history",
            EntityKind::User => "user",
            EntityKind::Settings => "settings",
            EntityKind::Backup => "backup",
        }
    }

    /// Prefix of generated identifiers (`p-1`, `v-1`, ...).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::Patient => "p",
            EntityKind::Visit => "v",
            EntityKind::Appointment => "a",
            EntityKind::Document => "d",
            EntityKind::TestResult => "r",
            EntityKind::MedicalHistory => "mh",
            EntityKind::User => "u",
            EntityKind::Settings => "s",
            EntityKind::Backup => "b",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

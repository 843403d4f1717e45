//! Clinic configuration and application paths.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::auth::{LockoutPolicy, Session};
use crate::db::Database;
use crate::managers::{audit, ManagerResult};
use crate::models::EntityKind;
use crate::report::ClinicHeader;
use crate::validation::{self, ValidationError};

/// Application directory name under the platform data directory.
pub const APP_DIR_NAME: &str = "MedicalClinic";

/// Settings key holding the serialized [`ClinicConfig`].
pub const CONFIG_KEY: &str = "clinic_config";

/// Default tracing filter when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Clinic-wide settings. Missing fields fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClinicConfig {
    pub clinic_name: String,
    pub clinic_address: String,
    pub clinic_phone: String,
    pub clinic_email: String,
    /// Choices the host offers in its pickers. Stored records keep free
    /// text, so a doctor removed here still shows on past appointments.
    pub doctors: Vec<String>,
    pub specialties: Vec<String>,
    pub visit_reasons: Vec<String>,
    /// Offered first by [`ClinicConfig::document_categories_with`]
    pub document_categories: Vec<String>,
    /// Failed logins before an account locks
    pub max_login_attempts: u32,
    pub lockout_minutes: u32,
    /// Bound on copying an attachment into the document store
    pub upload_timeout_secs: u64,
    pub backups_to_keep: usize,
    pub default_appointment_minutes: u32,
    /// `EnvFilter` directives installed when the clinic is opened
    pub log_filter: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            clinic_name: "Medical Clinic".into(),
            clinic_address: "123 Health St, Medical City".into(),
            clinic_phone: "123-456-7890".into(),
            clinic_email: "info@medicalclinic.com".into(),
            doctors: strings(&["Dr. Smith", "Dr. Johnson", "Dr. Williams"]),
            specialties: strings(&[
                "General Medicine",
                "Pediatrics",
                "Cardiology",
                "Dermatology",
                "Orthopedics",
            ]),
            visit_reasons: strings(&[
                "Check-up",
                "Follow-up",
                "Consultation",
                "Prescription Renewal",
                "Test Results",
                "Emergency",
                "Other",
            ]),
            document_categories: strings(&[
                "Lab Results",
                "Imaging",
                "Prescription",
                "Referral",
                "Consent Form",
                "Other",
            ]),
            max_login_attempts: 5,
            lockout_minutes: 15,
            upload_timeout_secs: 30,
            backups_to_keep: 10,
            default_appointment_minutes: 30,
            log_filter: DEFAULT_LOG_FILTER.into(),
        }
    }
}

impl ClinicConfig {
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_attempts: self.max_login_attempts,
            lockout_minutes: self.lockout_minutes,
        }
    }

    pub fn clinic_header(&self) -> ClinicHeader {
        ClinicHeader {
            name: self.clinic_name.clone(),
            address: self.clinic_address.clone(),
            phone: self.clinic_phone.clone(),
            email: self.clinic_email.clone(),
        }
    }

    pub fn upload_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upload_timeout_secs)
    }

    /// Configured categories in their configured order, followed by any
    /// other category already in use (compared case-insensitively).
    pub fn document_categories_with(&self, in_use: Vec<String>) -> Vec<String> {
        let mut categories = self.document_categories.clone();
        for category in in_use {
            if !categories.iter().any(|c| c.eq_ignore_ascii_case(&category)) {
                categories.push(category);
            }
        }
        categories
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::required("clinic_name", &self.clinic_name)?;
        validation::email("clinic_email", Some(&self.clinic_email))?;
        validation::phone("clinic_phone", Some(&self.clinic_phone))?;
        validation::appointment_duration(self.default_appointment_minutes)?;
        if self.max_login_attempts == 0 {
            return Err(ValidationError::new("max_login_attempts", "must be at least 1"));
        }
        if self.upload_timeout_secs == 0 {
            return Err(ValidationError::new("upload_timeout_secs", "must be at least 1"));
        }
        if self.backups_to_keep == 0 {
            return Err(ValidationError::new("backups_to_keep", "must be at least 1"));
        }
        if let Err(e) = EnvFilter::try_new(&self.log_filter) {
            return Err(ValidationError::new("log_filter", e.to_string()));
        }
        Ok(())
    }
}

/// Loads and saves [`ClinicConfig`] in the settings table.
pub struct ConfigStore<'a> {
    db: &'a Database,
}

impl<'a> ConfigStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Stored configuration, or the defaults when none was saved yet.
    pub fn load(&self) -> ManagerResult<ClinicConfig> {
        match self.db.get_setting(CONFIG_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json).map_err(crate::db::DbError::from)?),
            None => Ok(ClinicConfig::default()),
        }
    }

    /// Replace the configuration. Admin only.
    pub fn save(&self, session: &Session, config: &ClinicConfig) -> ManagerResult<()> {
        session.require_admin("changing clinic settings")?;
        config.validate()?;
        let json = serde_json::to_string(config).map_err(crate::db::DbError::from)?;

        self.db.atomically(|db| {
            db.put_setting(CONFIG_KEY, &json)?;
            audit(db, session, "settings.save", EntityKind::Settings, CONFIG_KEY, None)?;
            info!(actor = session.actor(), "Clinic settings saved");
            Ok(())
        })
    }
}

/// Locations of the database, stored documents and backups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// `<platform data dir>/MedicalClinic`, if the platform has one.
    pub fn default_location() -> Option<Self> {
        dirs::data_local_dir().map(|dir| Self::new(dir.join(APP_DIR_NAME)))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("clinic.db")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    /// Create every directory.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.documents_dir())?;
        std::fs::create_dir_all(self.backups_dir())?;
        Ok(())
    }
}

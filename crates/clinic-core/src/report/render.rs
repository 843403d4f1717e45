use std::fmt;

use chrono::{DateTime, Utc};

use super::ReportDocument;

const RULE_WIDTH: usize = 64;

impl ReportDocument {
    /// Export to pretty JSON. Field order follows the struct definitions.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Printable plain-text rendition.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn or_dash(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "-",
    }
}

fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "{title}")?;
    writeln!(f, "{}", "-".repeat(RULE_WIDTH))
}

impl fmt::Display for ReportDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clinic = &self.clinic;
        writeln!(f, "{}", clinic.name)?;
        if !clinic.address.is_empty() {
            writeln!(f, "{}", clinic.address)?;
        }
        writeln!(
            f,
            "Phone: {} | Email: {}",
            or_dash(Some(clinic.phone.as_str())),
            or_dash(Some(clinic.email.as_str()))
        )?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f, "PATIENT MEDICAL REPORT")?;
        writeln!(f, "As of: {}", timestamp(&self.as_of))?;
        let period = match (self.period.from, self.period.to) {
            (None, None) => "All records".to_string(),
            (from, to) => format!(
                "{} to {}",
                from.map_or("-".to_string(), |d| d.to_string()),
                to.map_or("-".to_string(), |d| d.to_string()),
            ),
        };
        writeln!(f, "Period: {period}")?;

        let p = &self.patient;
        heading(f, "PATIENT INFORMATION")?;
        writeln!(f, "Name:          {}", p.name)?;
        writeln!(f, "Patient ID:    {}", p.id)?;
        match (p.date_of_birth, p.age) {
            (Some(dob), Some(age)) => writeln!(f, "Date of Birth: {dob} (age {age})")?,
            (Some(dob), None) => writeln!(f, "Date of Birth: {dob}")?,
            _ => writeln!(f, "Date of Birth: -")?,
        }
        writeln!(f, "Gender:        {}", or_dash(p.gender.as_deref()))?;
        writeln!(f, "Phone:         {}", or_dash(p.phone.as_deref()))?;
        writeln!(f, "Email:         {}", or_dash(p.email.as_deref()))?;
        writeln!(f, "Address:       {}", or_dash(p.address.as_deref()))?;
        if let Some(external_id) = &p.external_id {
            writeln!(f, "External ID:   {external_id}")?;
        }
        writeln!(f, "Status:        {}", p.status.as_str())?;
        if let Some(history) = p.medical_history.as_deref().filter(|h| !h.trim().is_empty()) {
            writeln!(f, "History:       {history}")?;
        }

        heading(f, "MEDICAL HISTORY")?;
        if self.medical_history.is_empty() {
            writeln!(f, "No medical history recorded.")?;
        }
        for entry in &self.medical_history {
            write!(f, "{}  {:<10}  {}", entry.date, entry.kind, entry.condition)?;
            if let Some(notes) = &entry.notes {
                write!(f, "  {notes}")?;
            }
            if let Some(treatment) = &entry.treatment {
                write!(f, "  Treatment: {treatment}")?;
            }
            writeln!(f)?;
        }

        heading(f, "VISITS")?;
        if self.visits.is_empty() {
            writeln!(f, "No visits recorded.")?;
        }
        for visit in &self.visits {
            writeln!(
                f,
                "{}  {:<6}  {}  {}",
                timestamp(&visit.started_at),
                visit.status.as_str(),
                or_dash(visit.doctor.as_deref()),
                or_dash(visit.reason.as_deref()),
            )?;
            if let Some(diagnosis) = &visit.diagnosis {
                writeln!(f, "    Diagnosis: {diagnosis}")?;
            }
            if let Some(treatment) = &visit.treatment {
                writeln!(f, "    Treatment: {treatment}")?;
            }
            if let Some(follow_up) = &visit.follow_up {
                writeln!(f, "    Follow-up: {follow_up}")?;
            }
            if !visit.notes.is_empty() {
                writeln!(f, "    Notes: {}", visit.notes)?;
            }
        }

        heading(f, "APPOINTMENTS")?;
        if self.appointments.is_empty() {
            writeln!(f, "No appointments recorded.")?;
        }
        for appt in &self.appointments {
            write!(
                f,
                "{}  {:>3} min  {:<9}  {}  {}",
                timestamp(&appt.scheduled_at),
                appt.duration_minutes,
                appt.status.as_str(),
                or_dash(appt.doctor.as_deref()),
                or_dash(appt.reason.as_deref()),
            )?;
            if let Some(visit_id) = &appt.visit_id {
                write!(f, "  (visit {visit_id})")?;
            }
            if let Some(reason) = &appt.cancel_reason {
                write!(f, "  Cancelled: {reason}")?;
            }
            writeln!(f)?;
        }

        heading(f, "DOCUMENTS")?;
        if self.documents.is_empty() {
            writeln!(f, "No documents recorded.")?;
        }
        for doc in &self.documents {
            write!(
                f,
                "{}  {}  {}",
                doc.uploaded_at.date_naive(),
                doc.category,
                doc.name
            )?;
            if let (Some(file), Some(size)) = (&doc.file_name, doc.file_size) {
                write!(f, "  ({file}, {size} bytes)")?;
            }
            writeln!(f)?;
        }

        heading(f, "TEST RESULTS")?;
        if self.test_results.is_empty() {
            writeln!(f, "No test results recorded.")?;
        }
        for result in &self.test_results {
            write!(f, "{}  {}: {}", result.test_date, result.test_name, result.value)?;
            if let Some(unit) = &result.unit {
                write!(f, " {unit}")?;
            }
            if let Some(range) = &result.reference_range {
                write!(f, "  (ref {range})")?;
            }
            if result.superseded {
                write!(f, "  [superseded]")?;
            }
            writeln!(f)?;
        }

        let t = &self.totals;
        heading(f, "TOTALS")?;
        writeln!(
            f,
            "Visits: {}  Appointments: {} ({} completed, {} cancelled)",
            t.visits, t.appointments, t.completed_appointments, t.cancelled_appointments
        )?;
        writeln!(
            f,
            "Documents: {}  Test results: {}  History entries: {}",
            t.documents, t.test_results, t.medical_history
        )
    }
}

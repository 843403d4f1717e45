//! Documents manager: metadata in the database, files under the documents
//! directory as `<patient_id>/<document_id><ext>`.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{audit, clean, ManagerError, ManagerResult};
use crate::auth::Session;
use crate::db::Database;
use crate::models::{Document, DocumentInput, DocumentParent, EntityKind};
use crate::validation::{self, ValidationError};

/// Default bound on copying an attachment into the store.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

const COPY_CHUNK_SIZE: usize = 64 * 1024;
const PARTIAL_SUFFIX: &str = "partial";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyState {
    Running,
    Cancelled,
    Finished,
}

/// Size and hex SHA-256 of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub size: u64,
    pub checksum: String,
}

fn lock_state(state: &Mutex<CopyState>) -> io::Result<std::sync::MutexGuard<'_, CopyState>> {
    state
        .lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "copy state lock poisoned"))
}

/// Copy `reader` into `dest` chunk by chunk, hashing as it goes. Stops early
/// when the state flips to `Cancelled`.
fn copy_chunks<R: Read>(reader: &mut R, dest: &Path, state: &Mutex<CopyState>) -> io::Result<StoredFile> {
    let mut out = File::create(dest)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        if *lock_state(state)? == CopyState::Cancelled {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "copy cancelled"));
        }
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    out.sync_all()?;

    Ok(StoredFile {
        size,
        checksum: hex::encode(hasher.finalize()),
    })
}

/// Copy `reader` to `dest` on a worker thread, giving up after `timeout`.
///
/// Data lands in `<dest>.partial` first and is renamed into place only on
/// success. On timeout or failure neither file is left behind; a worker that
/// is still running removes its partial file once it notices cancellation.
pub fn copy_with_timeout<R>(mut reader: R, dest: &Path, timeout: Duration) -> io::Result<StoredFile>
where
    R: Read + Send + 'static,
{
    let partial = partial_path(dest);
    let state = Arc::new(Mutex::new(CopyState::Running));
    let (tx, rx) = mpsc::channel();

    let worker_state = Arc::clone(&state);
    let worker_partial = partial.clone();
    thread::spawn(move || {
        let result = copy_chunks(&mut reader, &worker_partial, &worker_state);
        let Ok(mut state) = lock_state(&worker_state) else {
            let _ = fs::remove_file(&worker_partial);
            return;
        };
        if *state == CopyState::Cancelled || result.is_err() {
            let _ = fs::remove_file(&worker_partial);
        }
        if *state == CopyState::Running {
            *state = CopyState::Finished;
            // Sent under the lock so the receiver sees it once it observes Finished.
            let _ = tx.send(result);
        }
    });

    let result = match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => {
            let mut guard = lock_state(&state)?;
            if *guard == CopyState::Finished {
                drop(guard);
                rx.recv()
                    .map_err(|_| io::Error::new(io::ErrorKind::Other, "copy worker vanished"))?
            } else {
                *guard = CopyState::Cancelled;
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("copy did not finish within {:?}", timeout),
                ));
            }
        }
    };

    let stored = result?;
    if let Err(e) = fs::rename(&partial, dest) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    Ok(stored)
}

/// Hidden sibling `.<name>.incoming` holding a replacement until it is committed.
fn staging_path(dest: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(dest.file_name().unwrap_or_default());
    name.push(".incoming");
    dest.with_file_name(name)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Hash an existing file.
pub fn file_checksum(path: &Path) -> io::Result<StoredFile> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(StoredFile {
        size,
        checksum: hex::encode(hasher.finalize()),
    })
}

/// Documents manager.
pub struct DocumentManager<'a> {
    db: &'a Database,
    root: PathBuf,
    upload_timeout: Duration,
}

impl<'a> DocumentManager<'a> {
    pub fn new(db: &'a Database, root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            root: root.into(),
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn get(&self, id: &str) -> ManagerResult<Document> {
        self.db
            .get_document(id)?
            .ok_or_else(|| ManagerError::not_found(EntityKind::Document, id))
    }

    fn validate_input(input: DocumentInput) -> ManagerResult<DocumentInput> {
        let name = validation::required("name", &input.name)?.to_string();
        validation::max_length("name", &name, 255)?;
        let category = validation::required("category", &input.category)?.to_string();
        Ok(DocumentInput {
            name,
            category,
            description: clean(input.description),
        })
    }

    /// Resolve the owning patient (and visit) of a parent reference.
    fn resolve_parent(&self, parent: &DocumentParent) -> ManagerResult<(String, Option<String>)> {
        match parent {
            DocumentParent::Patient(id) => {
                if self.db.get_patient(id)?.is_none() {
                    return Err(ManagerError::not_found(EntityKind::Patient, id));
                }
                Ok((id.clone(), None))
            }
            DocumentParent::Visit(id) => {
                let visit = self
                    .db
                    .get_visit(id)?
                    .ok_or_else(|| ManagerError::not_found(EntityKind::Visit, id))?;
                Ok((visit.patient_id, Some(visit.id)))
            }
        }
    }

    fn check_source(source: Option<&Path>) -> ManagerResult<()> {
        match source {
            Some(source) if !source.is_file() => Err(ValidationError::new(
                "source",
                format!("{} is not a readable file", source.display()),
            )
            .into()),
            _ => Ok(()),
        }
    }

    /// Copy `source` to `dest` inside the store within the upload timeout.
    fn store_file(&self, document_id: &str, source: &Path, dest: &Path) -> ManagerResult<StoredFile> {
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)?;
        }
        copy_with_timeout(File::open(source)?, dest, self.upload_timeout).map_err(|e| {
            warn!(document_id, error = %e, "Document upload failed");
            ManagerError::from(e)
        })
    }

    /// Attach a document to a patient or visit, optionally copying a file
    /// into the store.
    pub fn attach(
        &self,
        session: &Session,
        parent: DocumentParent,
        input: DocumentInput,
        source: Option<&Path>,
    ) -> ManagerResult<Document> {
        let input = Self::validate_input(input)?;
        Self::check_source(source)?;

        let mut stored_path = None;
        let attached: ManagerResult<Document> = self.db.atomically(|db| {
            let (patient_id, visit_id) = self.resolve_parent(&parent)?;
            let id = db.next_id(EntityKind::Document)?;
            let mut document = Document::new(id, patient_id, visit_id, input);

            if let Some(source) = source {
                let file_name = stored_file_name(&document.patient_id, &document.id, source);
                let dest = self.root.join(&file_name);
                let stored = self.store_file(&document.id, source, &dest)?;
                stored_path = Some(dest);
                document.file_name = Some(file_name);
                document.file_size = Some(stored.size);
                document.checksum = Some(stored.checksum);
            }

            db.insert_document(&document)?;
            audit(
                db,
                session,
                "document.attach",
                EntityKind::Document,
                &document.id,
                Some(json!({
                    "patient_id": document.patient_id,
                    "visit_id": document.visit_id,
                })),
            )?;
            Ok(document)
        });

        // Covers a failed commit as well as a failed insert
        let document = match attached {
            Ok(document) => document,
            Err(e) => {
                if let Some(path) = &stored_path {
                    let _ = fs::remove_file(path);
                }
                return Err(e);
            }
        };
        info!(
            document_id = %document.id,
            patient_id = %document.patient_id,
            actor = session.actor(),
            "Document attached"
        );
        Ok(document)
    }

    /// Replace a document's name, category and description.
    pub fn update_metadata(&self, session: &Session, id: &str, input: DocumentInput) -> ManagerResult<Document> {
        self.update(session, id, input, None)
    }

    /// Replace a document's metadata and, when `source` is given, its stored
    /// file. The id and upload time stay the same.
    ///
    /// The new file is staged next to the old one and moved into place only
    /// after the record is committed; a stored file under a different name
    /// (another extension) is then removed.
    pub fn update(
        &self,
        session: &Session,
        id: &str,
        input: DocumentInput,
        source: Option<&Path>,
    ) -> ManagerResult<Document> {
        let input = Self::validate_input(input)?;
        Self::check_source(source)?;

        let mut document = self.get(id)?;
        let previous = document.file_name.clone();
        let staged = match source {
            Some(source) => {
                let file_name = stored_file_name(&document.patient_id, &document.id, source);
                let staging = staging_path(&self.root.join(&file_name));
                let stored = self.store_file(id, source, &staging)?;
                Some((file_name, staging, stored))
            }
            None => None,
        };

        document.name = input.name;
        document.category = input.category;
        document.description = input.description;
        document.updated_at = Utc::now();
        if let Some((file_name, _, stored)) = &staged {
            document.file_name = Some(file_name.clone());
            document.file_size = Some(stored.size);
            document.checksum = Some(stored.checksum.clone());
        }

        let saved: ManagerResult<()> = self.db.atomically(|db| {
            db.update_document(&document)?;
            audit(
                db,
                session,
                "document.update",
                EntityKind::Document,
                id,
                Some(json!({ "file_replaced": staged.is_some() })),
            )
        });

        let Some((file_name, staging, _)) = staged else {
            saved?;
            info!(document_id = id, actor = session.actor(), "Document metadata updated");
            return Ok(document);
        };
        if let Err(e) = saved {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        fs::rename(&staging, self.root.join(&file_name))?;
        if let Some(old) = previous.filter(|old| *old != file_name) {
            if let Err(e) = fs::remove_file(self.root.join(&old)) {
                warn!(document_id = id, file = %old, error = %e, "Could not remove replaced file");
            }
        }
        info!(document_id = id, actor = session.actor(), "Document file replaced");
        Ok(document)
    }

    /// Remove a document record and, once that is committed, its stored file.
    pub fn delete(&self, session: &Session, id: &str) -> ManagerResult<()> {
        let document = self.db.atomically(|db| {
            let document = self.get(id)?;
            db.delete_document(id)?;
            audit(db, session, "document.delete", EntityKind::Document, id, None)?;
            Ok::<_, ManagerError>(document)
        })?;

        if let Some(file_name) = &document.file_name {
            if let Err(e) = fs::remove_file(self.root.join(file_name)) {
                warn!(document_id = id, file = %file_name, error = %e, "Could not remove stored file");
            }
        }
        info!(document_id = id, actor = session.actor(), "Document deleted");
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> ManagerResult<Option<Document>> {
        Ok(self.db.get_document(id)?)
    }

    /// Documents of a patient (including those on its visits) or of a single
    /// visit, oldest first.
    pub fn list_for(&self, parent: &DocumentParent) -> ManagerResult<Vec<Document>> {
        debug!(?parent, "Listing documents");
        match parent {
            DocumentParent::Patient(id) => {
                self.resolve_parent(parent)?;
                Ok(self.db.list_documents_for_patient(id)?)
            }
            DocumentParent::Visit(id) => {
                self.resolve_parent(parent)?;
                Ok(self.db.list_documents_for_visit(id)?)
            }
        }
    }

    pub fn list_by_category(&self, patient_id: &str, category: &str) -> ManagerResult<Vec<Document>> {
        let documents = self.list_for(&DocumentParent::Patient(patient_id.to_string()))?;
        Ok(documents
            .into_iter()
            .filter(|d| d.category.eq_ignore_ascii_case(category.trim()))
            .collect())
    }

    /// Categories currently in use, sorted.
    pub fn categories(&self) -> ManagerResult<Vec<String>> {
        Ok(self.db.list_document_categories()?)
    }

    /// Absolute path of a document's stored file, if it has one.
    pub fn file_path(&self, id: &str) -> ManagerResult<Option<PathBuf>> {
        let document = self.get(id)?;
        Ok(document.file_name.map(|name| self.root.join(name)))
    }

    /// Whether the stored file still matches its recorded checksum.
    /// Documents without a file have nothing to verify.
    pub fn verify_integrity(&self, id: &str) -> ManagerResult<bool> {
        let document = self.get(id)?;
        let (Some(file_name), Some(expected)) = (&document.file_name, &document.checksum) else {
            return Ok(true);
        };

        match file_checksum(&self.root.join(file_name)) {
            Ok(stored) => {
                let intact = &stored.checksum == expected;
                if !intact {
                    warn!(document_id = id, "Document checksum mismatch");
                }
                Ok(intact)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(document_id = id, "Stored file missing");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// `<patient_id>/<document_id><.ext>`, keeping the source extension.
fn stored_file_name(patient_id: &str, document_id: &str, source: &Path) -> String {
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}/{}.{}", patient_id, document_id, ext.to_ascii_lowercase()),
        None => format!("{}/{}", patient_id, document_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::test_support::setup;
    use crate::managers::PatientManager;
    use crate::models::{PatientDetails, VisitInput};
    use std::time::Instant;

    fn input(name: &str, category: &str) -> DocumentInput {
        DocumentInput {
            name: name.into(),
            category: category.into(),
            description: None,
        }
    }

    fn with_patient() -> (Database, Session, tempfile::TempDir) {
        let (db, session) = setup();
        PatientManager::new(&db)
            .create(&session, PatientDetails::new("Jane Doe"))
            .unwrap();
        (db, session, tempfile::tempdir().unwrap())
    }

    /// Reader that sleeps before every chunk.
    struct SlowReader {
        remaining: usize,
        delay: Duration,
    }

    impl Read for SlowReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Ok(0);
            }
            thread::sleep(self.delay);
            let n = buf.len().min(self.remaining).min(16);
            buf[..n].fill(b'x');
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_attach_with_file() {
        let (db, session, dir) = with_patient();
        let source = dir.path().join("scan.PDF");
        fs::write(&source, b"%PDF-1.4 test").unwrap();

        let manager = DocumentManager::new(&db, dir.path().join("documents"));
        let document = manager
            .attach(
                &session,
                DocumentParent::Patient("p-1".into()),
                input("Referral letter", "Referral"),
                Some(&source),
            )
            .unwrap();

        assert_eq!(document.id, "d-1");
        assert_eq!(document.file_name.as_deref(), Some("p-1/d-1.pdf"));
        assert_eq!(document.file_size, Some(13));
        assert_eq!(
            document.checksum.as_deref(),
            Some(crate::audit::hash_data(b"%PDF-1.4 test").as_str())
        );

        let path = manager.file_path("d-1").unwrap().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.4 test");
        assert!(!partial_path(&path).exists());
        assert!(manager.verify_integrity("d-1").unwrap());

        fs::write(&path, b"tampered").unwrap();
        assert!(!manager.verify_integrity("d-1").unwrap());
    }

    #[test]
    fn test_attach_to_visit() {
        let (db, session, dir) = with_patient();
        let visit = PatientManager::new(&db)
            .start_visit(&session, "p-1", VisitInput::default())
            .unwrap();
        let manager = DocumentManager::new(&db, dir.path());

        let document = manager
            .attach(&session, DocumentParent::Visit(visit.id.clone()), input("ECG", "Imaging"), None)
            .unwrap();
        assert_eq!(document.patient_id, "p-1");
        assert_eq!(document.visit_id.as_deref(), Some("v-1"));
        assert!(!document.has_file());

        assert_eq!(manager.list_for(&DocumentParent::Visit("v-1".into())).unwrap().len(), 1);
        assert_eq!(manager.list_for(&DocumentParent::Patient("p-1".into())).unwrap().len(), 1);
        assert!(manager.verify_integrity("d-1").unwrap());
    }

    #[test]
    fn test_attach_validation() {
        let (db, session, dir) = with_patient();
        let manager = DocumentManager::new(&db, dir.path());

        assert!(matches!(
            manager.attach(&session, DocumentParent::Patient("p-404".into()), input("X", "Lab"), None),
            Err(ManagerError::NotFound { entity: EntityKind::Patient, .. })
        ));
        assert!(matches!(
            manager.attach(&session, DocumentParent::Visit("v-404".into()), input("X", "Lab"), None),
            Err(ManagerError::NotFound { entity: EntityKind::Visit, .. })
        ));
        assert!(matches!(
            manager.attach(&session, DocumentParent::Patient("p-1".into()), input(" ", "Lab"), None),
            Err(ManagerError::Validation(_))
        ));
        assert!(matches!(
            manager.attach(
                &session,
                DocumentParent::Patient("p-1".into()),
                input("X", "Lab"),
                Some(&dir.path().join("missing.pdf"))
            ),
            Err(ManagerError::Validation(_))
        ));
    }

    #[test]
    fn test_update_delete_and_listing() {
        let (db, session, dir) = with_patient();
        let source = dir.path().join("result.txt");
        fs::write(&source, b"glucose 5.4").unwrap();
        let manager = DocumentManager::new(&db, dir.path().join("store"));
        let parent = DocumentParent::Patient("p-1".into());

        manager.attach(&session, parent.clone(), input("Lab", "Lab Results"), Some(&source)).unwrap();
        manager.attach(&session, parent.clone(), input("X-ray", "Imaging"), None).unwrap();

        let listed = manager.list_for(&parent).unwrap();
        assert_eq!(listed.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["d-1", "d-2"]);
        assert_eq!(manager.list_by_category("p-1", "imaging").unwrap().len(), 1);
        assert_eq!(manager.categories().unwrap(), vec!["Imaging".to_string(), "Lab Results".to_string()]);

        let updated = manager
            .update_metadata(&session, "d-2", input("Chest X-ray", "Imaging"))
            .unwrap();
        assert_eq!(updated.name, "Chest X-ray");

        let path = manager.file_path("d-1").unwrap().unwrap();
        manager.delete(&session, "d-1").unwrap();
        assert!(!path.exists());
        assert!(manager.find_by_id("d-1").unwrap().is_none());
        assert!(matches!(manager.delete(&session, "d-1"), Err(ManagerError::NotFound { .. })));
    }

    #[test]
    fn test_update_replaces_stored_file() {
        let (db, session, dir) = with_patient();
        let scan = dir.path().join("scan.pdf");
        fs::write(&scan, b"%PDF-1.4 blurry").unwrap();
        let manager = DocumentManager::new(&db, dir.path().join("store"));
        let original = manager
            .attach(&session, DocumentParent::Patient("p-1".into()), input("Scan", "Imaging"), Some(&scan))
            .unwrap();
        let old_path = manager.file_path(&original.id).unwrap().unwrap();

        let rescan = dir.path().join("rescan.png");
        fs::write(&rescan, b"\x89PNG sharp image").unwrap();
        let updated = manager
            .update(&session, &original.id, input("Scan (rescanned)", "Imaging"), Some(&rescan))
            .unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.uploaded_at, original.uploaded_at);
        assert_eq!(updated.file_name.as_deref(), Some("p-1/d-1.png"));
        assert_eq!(updated.file_size, Some(16));
        assert_ne!(updated.checksum, original.checksum);
        assert_eq!(manager.find_by_id("d-1").unwrap(), Some(updated.clone()));

        let new_path = manager.file_path("d-1").unwrap().unwrap();
        assert_eq!(fs::read(&new_path).unwrap(), b"\x89PNG sharp image");
        assert!(!old_path.exists());
        assert!(!staging_path(&new_path).exists());
        assert!(manager.verify_integrity("d-1").unwrap());

        // Same extension: replaced in place
        fs::write(&rescan, b"\x89PNG sharper").unwrap();
        manager
            .update(&session, "d-1", input("Scan (rescanned)", "Imaging"), Some(&rescan))
            .unwrap();
        assert_eq!(fs::read(&new_path).unwrap(), b"\x89PNG sharper");
        assert!(manager.verify_integrity("d-1").unwrap());
    }

    #[test]
    fn test_update_without_source_keeps_file() {
        let (db, session, dir) = with_patient();
        let scan = dir.path().join("scan.pdf");
        fs::write(&scan, b"%PDF-1.4 scan").unwrap();
        let manager = DocumentManager::new(&db, dir.path().join("store"));
        let original = manager
            .attach(&session, DocumentParent::Patient("p-1".into()), input("Scan", "Imaging"), Some(&scan))
            .unwrap();

        let updated = manager
            .update_metadata(&session, &original.id, input("Chest scan", "Radiology"))
            .unwrap();
        assert_eq!(updated.category, "Radiology");
        assert_eq!(updated.file_name, original.file_name);
        assert_eq!(updated.checksum, original.checksum);
        assert!(manager.verify_integrity(&original.id).unwrap());
    }

    #[test]
    fn test_failed_write_leaves_no_stored_file() {
        let (db, session, dir) = with_patient();
        let scan = dir.path().join("scan.pdf");
        fs::write(&scan, b"%PDF-1.4 scan").unwrap();
        let store = dir.path().join("store");
        let manager = DocumentManager::new(&db, &store);
        let original = manager
            .attach(&session, DocumentParent::Patient("p-1".into()), input("Scan", "Imaging"), Some(&scan))
            .unwrap();

        db.conn()
            .execute_batch(
                "CREATE TEMP TRIGGER audit_unavailable BEFORE INSERT ON audit_log \
                 BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END;",
            )
            .unwrap();

        assert!(manager
            .attach(&session, DocumentParent::Patient("p-1".into()), input("Lab", "Lab"), Some(&scan))
            .is_err());
        assert!(manager.find_by_id("d-2").unwrap().is_none());
        assert!(!store.join("p-1").join("d-2.pdf").exists());

        let rescan = dir.path().join("rescan.png");
        fs::write(&rescan, b"png").unwrap();
        assert!(manager
            .update(&session, &original.id, input("Scan", "Imaging"), Some(&rescan))
            .is_err());
        let files: Vec<_> = fs::read_dir(store.join("p-1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["d-1.pdf".to_string()]);
        assert!(manager.verify_integrity(&original.id).unwrap());
    }

    #[test]
    fn test_copy_with_timeout_times_out_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("slow.bin");
        let reader = SlowReader {
            remaining: 1024,
            delay: Duration::from_millis(50),
        };

        let err = copy_with_timeout(reader, &dest, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(!dest.exists());

        // The worker removes its partial file once it sees the cancellation.
        let partial = partial_path(&dest);
        let deadline = Instant::now() + Duration::from_secs(5);
        while partial.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!partial.exists());
    }

    #[test]
    fn test_copy_with_timeout_completes() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fast.bin");
        let reader = SlowReader {
            remaining: 32,
            delay: Duration::from_millis(1),
        };

        let stored = copy_with_timeout(reader, &dest, Duration::from_secs(10)).unwrap();
        assert_eq!(stored.size, 32);
        assert_eq!(fs::read(&dest).unwrap(), vec![b'x'; 32]);
        assert_eq!(file_checksum(&dest).unwrap(), stored);
    }

    #[test]
    fn test_stored_file_name() {
        assert_eq!(stored_file_name("p-1", "d-3", Path::new("/tmp/a.JPG")), "p-1/d-3.jpg");
        assert_eq!(stored_file_name("p-1", "d-3", Path::new("/tmp/README")), "p-1/d-3");
    }
}

//! Document metadata database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::Document;

const DOCUMENT_COLUMNS: &str = "id, patient_id, visit_id, name, category, description, \
                                file_name, file_size, checksum, uploaded_at, updated_at";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        visit_id: row.get(2)?,
        name: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        file_name: row.get(6)?,
        file_size: row.get::<_, Option<i64>>(7)?.map(|size| size.max(0) as u64),
        checksum: row.get(8)?,
        uploaded_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl Database {
    /// Insert document metadata.
    pub fn insert_document(&self, document: &Document) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO documents (
                id, patient_id, visit_id, name, category, description,
                file_name, file_size, checksum, uploaded_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                document.id,
                document.patient_id,
                document.visit_id,
                document.name,
                document.category,
                document.description,
                document.file_name,
                document.file_size.map(|size| size as i64),
                document.checksum,
                document.uploaded_at,
                document.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update a document's metadata and stored-file fields.
    pub fn update_document(&self, document: &Document) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE documents SET
                name = ?2,
                category = ?3,
                description = ?4,
                file_name = ?5,
                file_size = ?6,
                checksum = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                document.id,
                document.name,
                document.category,
                document.description,
                document.file_name,
                document.file_size.map(|size| size as i64),
                document.checksum,
                document.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a document by ID.
    pub fn get_document(&self, id: &str) -> DbResult<Option<Document>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS),
                [id],
                document_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List all documents of a patient (including visit-scoped ones), oldest first.
    pub fn list_documents_for_patient(&self, patient_id: &str) -> DbResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM documents WHERE patient_id = ? ORDER BY uploaded_at, rowid",
            DOCUMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([patient_id], document_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List documents attached to a visit, oldest first.
    pub fn list_documents_for_visit(&self, visit_id: &str) -> DbResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM documents WHERE visit_id = ? ORDER BY uploaded_at, rowid",
            DOCUMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([visit_id], document_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Distinct document categories in use, sorted.
    pub fn list_document_categories(&self) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT category FROM documents ORDER BY category")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete document metadata.
    pub fn delete_document(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM documents WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

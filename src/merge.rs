use crate::extract::ExtractedStudent;
use crate::promotion;
use crate::record::StudentAcademicRecord;
use crate::store::{self, WriteOutcome};
use rusqlite::Connection;
use serde::Serialize;

/// Fold one extracted semester into the persisted record for its
/// matricule. The incoming semester subtree replaces any previous subtree
/// under the same code wholesale; every other semester is untouched.
/// Identity fields are overwritten only when the sheet provided them.
pub fn merge_semester(
    existing: Option<StudentAcademicRecord>,
    incoming: &ExtractedStudent,
    now: &str,
) -> StudentAcademicRecord {
    let mut record =
        existing.unwrap_or_else(|| StudentAcademicRecord::new(incoming.matricule, now));

    if let Some(department) = &incoming.department {
        record.department = department.clone();
    }
    if let Some(prenom) = &incoming.prenom {
        record.prenom = prenom.clone();
    }
    if let Some(nom) = &incoming.nom {
        record.nom = nom.clone();
    }

    record
        .semesters
        .insert(incoming.semester.clone(), incoming.block.clone());

    if let Some(niveau) = promotion::evaluate(
        record.niveau.as_deref(),
        &incoming.semester,
        &incoming.block.academic_year,
        &record.semesters,
    ) {
        record.niveau = Some(niveau);
    }

    record.updated_at = now.to_string();
    record
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    pub matricule: i64,
    pub error: String,
}

/// Outcome of ingesting one sheet: per-student failures are collected,
/// never allowed to abort the rest of the batch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<BatchError>,
}

pub fn ingest_students(
    conn: &Connection,
    students: &[ExtractedStudent],
    now: &str,
) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        total: students.len(),
        ..Default::default()
    };

    for student in students {
        match ingest_one(conn, student, now) {
            Ok(WriteOutcome::Created) => outcome.created += 1,
            Ok(WriteOutcome::Updated) => outcome.updated += 1,
            Err(e) => outcome.errors.push(BatchError {
                matricule: student.matricule,
                error: e.to_string(),
            }),
        }
    }

    outcome
}

fn ingest_one(
    conn: &Connection,
    student: &ExtractedStudent,
    now: &str,
) -> anyhow::Result<WriteOutcome> {
    let existing = store::get_record(conn, student.matricule)?;
    let merged = merge_semester(existing, student, now);
    store::upsert_record(conn, &merged)
}

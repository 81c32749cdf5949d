use crate::record::{is_semester_code, StudentAcademicRecord};
use rusqlite::{Connection, OptionalExtension};
use std::fmt;
use std::path::Path;

/// Store-level failures the callers must distinguish from plumbing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested matricule (or one of its semester subtrees) is absent.
    RecordNotFound(i64),
    /// A write matched/modified zero rows where one was expected.
    MergeConflict(i64),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::RecordNotFound(m) => write!(f, "no record for matricule {m}"),
            StoreError::MergeConflict(m) => {
                write!(f, "write for matricule {m} modified no rows")
            }
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("transcript.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    // One document per student, keyed by matricule. The JSON body is the
    // canonical record; the timestamp columns mirror it for cheap listing.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records(
            matricule INTEGER PRIMARY KEY,
            doc TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS uploads(
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            handle TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            year TEXT NOT NULL,
            students_count INTEGER NOT NULL,
            file_size INTEGER NOT NULL,
            uploaded_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_uploads_year ON uploads(year)",
        [],
    )?;

    Ok(())
}

pub fn get_record(conn: &Connection, matricule: i64) -> anyhow::Result<Option<StudentAcademicRecord>> {
    let doc: Option<String> = conn
        .query_row(
            "SELECT doc FROM records WHERE matricule = ?",
            [matricule],
            |r| r.get(0),
        )
        .optional()?;
    match doc {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn scan_records(conn: &Connection) -> anyhow::Result<Vec<StudentAcademicRecord>> {
    let mut stmt = conn.prepare("SELECT doc FROM records ORDER BY matricule")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    let mut out: Vec<StudentAcademicRecord> = Vec::new();
    for row in rows {
        out.push(serde_json::from_str(&row?)?);
    }
    Ok(out)
}

/// Single point write of a whole merged document. The merge engine builds
/// the document; this commits it atomically or not at all.
pub fn upsert_record(
    conn: &Connection,
    record: &StudentAcademicRecord,
) -> anyhow::Result<WriteOutcome> {
    let existed: Option<i64> = conn
        .query_row(
            "SELECT matricule FROM records WHERE matricule = ?",
            [record.matricule],
            |r| r.get(0),
        )
        .optional()?;

    let doc = serde_json::to_string(record)?;
    let changed = conn.execute(
        "INSERT INTO records(matricule, doc, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4)
         ON CONFLICT(matricule) DO UPDATE SET
           doc = excluded.doc,
           updated_at = excluded.updated_at",
        (
            record.matricule,
            &doc,
            &record.created_at,
            &record.updated_at,
        ),
    )?;
    if changed == 0 {
        return Err(StoreError::MergeConflict(record.matricule).into());
    }

    Ok(if existed.is_some() {
        WriteOutcome::Updated
    } else {
        WriteOutcome::Created
    })
}

/// Flag update at a dotted path inside the document, refreshing updatedAt.
pub fn set_global_visibility(
    conn: &Connection,
    matricule: i64,
    is_public: bool,
    now: &str,
) -> anyhow::Result<()> {
    let changed = conn.execute(
        "UPDATE records
         SET doc = json_set(doc, '$.isPublicGlobale', json(?1), '$.updatedAt', ?2),
             updated_at = ?2
         WHERE matricule = ?3",
        (if is_public { "true" } else { "false" }, now, matricule),
    )?;
    if changed == 0 {
        return Err(StoreError::RecordNotFound(matricule).into());
    }
    Ok(())
}

pub fn set_semester_visibility(
    conn: &Connection,
    matricule: i64,
    semester: &str,
    is_public: bool,
    now: &str,
) -> anyhow::Result<()> {
    if !is_semester_code(semester) {
        anyhow::bail!("bad semester code: {semester}");
    }

    let probe = format!("$.semesters.{semester}");
    let has_semester: Option<Option<String>> = conn
        .query_row(
            "SELECT json_type(doc, ?1) FROM records WHERE matricule = ?2",
            (&probe, matricule),
            |r| r.get(0),
        )
        .optional()?;
    match has_semester {
        None => return Err(StoreError::RecordNotFound(matricule).into()),
        Some(None) => return Err(StoreError::RecordNotFound(matricule).into()),
        Some(Some(_)) => {}
    }

    let path = format!("$.semesters.{semester}.isPublic");
    let changed = conn.execute(
        "UPDATE records
         SET doc = json_set(doc, ?1, json(?2), '$.updatedAt', ?3),
             updated_at = ?3
         WHERE matricule = ?4",
        (
            &path,
            if is_public { "true" } else { "false" },
            now,
            matricule,
        ),
    )?;
    if changed == 0 {
        return Err(StoreError::MergeConflict(matricule).into());
    }
    Ok(())
}

/// Bulk retraction of one semester+year across the whole collection,
/// guarded by a nested-field predicate. Returns the number of records
/// that lost the subtree.
pub fn retract_semester(
    conn: &Connection,
    semester: &str,
    year: &str,
    now: &str,
) -> anyhow::Result<usize> {
    if !is_semester_code(semester) {
        anyhow::bail!("bad semester code: {semester}");
    }

    let subtree = format!("$.semesters.{semester}");
    let year_path = format!("$.semesters.{semester}.academicYear");
    let changed = conn.execute(
        "UPDATE records
         SET doc = json_set(json_remove(doc, ?1), '$.updatedAt', ?2),
             updated_at = ?2
         WHERE json_extract(doc, ?3) = ?4",
        (&subtree, now, &year_path, year),
    )?;
    Ok(changed)
}

pub struct UploadLog<'a> {
    pub id: &'a str,
    pub filename: &'a str,
    pub handle: &'a str,
    pub sha256: &'a str,
    pub year: &'a str,
    pub students_count: usize,
    pub file_size: usize,
    pub uploaded_at: &'a str,
}

pub fn log_upload(conn: &Connection, entry: &UploadLog<'_>) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO uploads(id, filename, handle, sha256, year, students_count, file_size, uploaded_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            entry.id,
            entry.filename,
            entry.handle,
            entry.sha256,
            entry.year,
            entry.students_count as i64,
            entry.file_size as i64,
            entry.uploaded_at,
        ),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SemesterBlock;

    fn sample(matricule: i64) -> StudentAcademicRecord {
        let mut rec = StudentAcademicRecord::new(matricule, "2025-01-01T00:00:00Z");
        rec.department = "DSI".to_string();
        rec.semesters.insert(
            "S1".to_string(),
            SemesterBlock {
                academic_year: "2023-2024".to_string(),
                moyenne_generale: 12.0,
                credit_total: 30,
                ..Default::default()
            },
        );
        rec
    }

    #[test]
    fn upsert_then_point_lookup() {
        let conn = open_in_memory().expect("db");
        let rec = sample(100);
        assert_eq!(
            upsert_record(&conn, &rec).expect("insert"),
            WriteOutcome::Created
        );
        assert_eq!(
            upsert_record(&conn, &rec).expect("replace"),
            WriteOutcome::Updated
        );

        let back = get_record(&conn, 100).expect("get").expect("present");
        assert_eq!(back, rec);
        assert!(get_record(&conn, 999).expect("get").is_none());
    }

    #[test]
    fn scan_returns_all_records_by_matricule() {
        let conn = open_in_memory().expect("db");
        for m in [3, 1, 2] {
            upsert_record(&conn, &sample(m)).expect("insert");
        }
        let all = scan_records(&conn).expect("scan");
        let keys: Vec<i64> = all.iter().map(|r| r.matricule).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn visibility_flags_update_in_place() {
        let conn = open_in_memory().expect("db");
        upsert_record(&conn, &sample(100)).expect("insert");

        set_global_visibility(&conn, 100, true, "2025-02-01T00:00:00Z").expect("global");
        set_semester_visibility(&conn, 100, "S1", true, "2025-02-01T00:00:00Z").expect("sem");

        let rec = get_record(&conn, 100).expect("get").expect("present");
        assert!(rec.is_public_globale);
        assert!(rec.semesters.get("S1").expect("S1").is_public);
        assert_eq!(rec.updated_at, "2025-02-01T00:00:00Z");
        // The rest of the document is untouched.
        assert_eq!(rec.semesters.get("S1").expect("S1").moyenne_generale, 12.0);
    }

    #[test]
    fn visibility_flags_surface_not_found() {
        let conn = open_in_memory().expect("db");
        upsert_record(&conn, &sample(100)).expect("insert");

        let missing_record =
            set_global_visibility(&conn, 999, true, "2025-02-01T00:00:00Z").expect_err("err");
        assert_eq!(
            missing_record.downcast_ref::<StoreError>(),
            Some(&StoreError::RecordNotFound(999))
        );

        let missing_semester =
            set_semester_visibility(&conn, 100, "S9", true, "2025-02-01T00:00:00Z")
                .expect_err("err");
        assert_eq!(
            missing_semester.downcast_ref::<StoreError>(),
            Some(&StoreError::RecordNotFound(100))
        );
    }

    #[test]
    fn retraction_matches_on_semester_and_year() {
        let conn = open_in_memory().expect("db");
        let mut a = sample(1);
        a.semesters.get_mut("S1").expect("S1").academic_year = "2023-2024".to_string();
        let mut b = sample(2);
        b.semesters.get_mut("S1").expect("S1").academic_year = "2024-2025".to_string();
        upsert_record(&conn, &a).expect("a");
        upsert_record(&conn, &b).expect("b");

        let n = retract_semester(&conn, "S1", "2023-2024", "2025-03-01T00:00:00Z").expect("bulk");
        assert_eq!(n, 1);

        let a_after = get_record(&conn, 1).expect("get").expect("present");
        assert!(a_after.semesters.is_empty());
        let b_after = get_record(&conn, 2).expect("get").expect("present");
        assert!(b_after.semesters.contains_key("S1"));
    }
}

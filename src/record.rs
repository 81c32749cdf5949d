use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Three-valued indicator used for "UE validee" and subject capitalization
/// cells. A blank source cell is `Unknown`, which is distinct from an
/// explicit no. On the wire it is `null` / `true` / `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Unknown,
    True,
    False,
}

impl TriState {
    pub fn from_bool(b: bool) -> Self {
        if b {
            TriState::True
        } else {
            TriState::False
        }
    }
}

impl Serialize for TriState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TriState::Unknown => serializer.serialize_none(),
            TriState::True => serializer.serialize_bool(true),
            TriState::False => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for TriState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<bool>::deserialize(deserializer)? {
            None => TriState::Unknown,
            Some(true) => TriState::True,
            Some(false) => TriState::False,
        })
    }
}

/// The four grade components of one subject. Blank or unparseable cells
/// land as 0; only the capitalization flag keeps blankness around.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectNotes {
    pub controle_continu: f64,
    pub session_normale: f64,
    pub session_rattrapage: f64,
    pub moyenne: f64,
    #[serde(default)]
    pub capitalise: TriState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub name: String,
    pub coef: f64,
    pub notes: SubjectNotes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleBlock {
    pub name: String,
    pub moyenne: f64,
    #[serde(default)]
    pub ue_valide: TriState,
    #[serde(default)]
    pub matieres: BTreeMap<String, Subject>,
}

/// One ingested term. `rang_general` / `rang_department` are single-sheet
/// ranks assigned once at ingestion time; cohort-wide cross-term ranks are
/// computed on demand by the ranking engine and never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterBlock {
    pub academic_year: String,
    #[serde(default)]
    pub is_public: bool,
    pub moyenne_generale: f64,
    pub credit_total: i64,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rang_general: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rang_department: Option<i64>,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleBlock>,
}

/// The persisted per-student document. The matricule is the store key and
/// never changes after creation; all mutation goes through the merge engine
/// or the visibility flag updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAcademicRecord {
    pub matricule: i64,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub prenom: String,
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub niveau: Option<String>,
    #[serde(default)]
    pub is_public_globale: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub semesters: BTreeMap<String, SemesterBlock>,
}

impl StudentAcademicRecord {
    pub fn new(matricule: i64, now: &str) -> Self {
        StudentAcademicRecord {
            matricule,
            department: String::new(),
            prenom: String::new(),
            nom: String::new(),
            niveau: None,
            is_public_globale: false,
            created_at: now.to_string(),
            updated_at: now.to_string(),
            semesters: BTreeMap::new(),
        }
    }
}

/// Semester codes are "S<positive integer>".
pub fn semester_number(code: &str) -> Option<u32> {
    let rest = code.strip_prefix('S')?;
    let n = rest.parse::<u32>().ok()?;
    if n == 0 {
        return None;
    }
    Some(n)
}

pub fn is_semester_code(code: &str) -> bool {
    semester_number(code).is_some()
}

/// Academic years are "YYYY-YYYY" with the second year one past the first.
pub fn is_academic_year(year: &str) -> bool {
    let Some((a, b)) = year.split_once('-') else {
        return false;
    };
    if a.len() != 4 || b.len() != 4 {
        return false;
    }
    match (a.parse::<i32>(), b.parse::<i32>()) {
        (Ok(start), Ok(end)) => end == start + 1,
        _ => false,
    }
}

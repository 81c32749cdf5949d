use crate::ranking;
use crate::record::{SemesterBlock, StudentAcademicRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// Publicly exposable view of one record. Identity and niveau are always
/// present; semester blocks appear only when their own isPublic flag is
/// set; the computed cross-term fields appear only when the record-level
/// isPublicGlobale flag is set, and are otherwise absent rather than
/// zeroed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProjection {
    pub matricule: i64,
    pub department: String,
    pub prenom: String,
    pub nom: String,
    pub niveau: Option<String>,
    pub semesters: BTreeMap<String, SemesterBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moyenne: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rang: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rang_department: Option<i64>,
}

/// Project one record against a cohort snapshot. The snapshot is only
/// consulted when the global flag requires rank computation.
pub fn project(record: &StudentAcademicRecord, cohort: &[StudentAcademicRecord]) -> PublicProjection {
    let semesters: BTreeMap<String, SemesterBlock> = record
        .semesters
        .iter()
        .filter(|(_, block)| block.is_public)
        .map(|(code, block)| (code.clone(), block.clone()))
        .collect();

    let mut projection = PublicProjection {
        matricule: record.matricule,
        department: record.department.clone(),
        prenom: record.prenom.clone(),
        nom: record.nom.clone(),
        niveau: record.niveau.clone(),
        semesters,
        moyenne: None,
        rang: None,
        rang_department: None,
    };

    if record.is_public_globale {
        projection.moyenne = Some(ranking::cross_term_average(record));
        let ranked = ranking::rank_cohort(cohort);
        if let Some(entry) = ranked.iter().find(|r| r.matricule == record.matricule) {
            projection.rang = Some(entry.rang);
            projection.rang_department = Some(entry.rang_department);
        }
    }

    projection
}

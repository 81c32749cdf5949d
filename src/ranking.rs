use crate::promotion::{self, Level};
use crate::record::{SemesterBlock, StudentAcademicRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Two-decimal presentation rounding used for every reported percentage.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Mean of the strictly positive general averages across a record's
/// semesters. Zero or invalid terms count toward neither sum nor divisor;
/// a record with no valid term yields 0.
pub fn cross_term_average(record: &StudentAcademicRecord) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for block in record.semesters.values() {
        if block.moyenne_generale > 0.0 {
            sum += block.moyenne_generale;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn record_level(record: &StudentAcademicRecord) -> Level {
    record
        .niveau
        .as_deref()
        .map(|n| promotion::parse_niveau(n).0)
        .unwrap_or(Level::L1)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub matricule: i64,
    pub prenom: String,
    pub nom: String,
    pub department: String,
    pub niveau: String,
    pub moyenne: f64,
    /// Ordinal position in the L3, L2, L1 concatenation. Presentation
    /// ordering only; per-level ranks carry the comparable meaning.
    pub rang: i64,
    pub rang_niveau: i64,
    pub rang_department: i64,
}

/// Rank a read-only snapshot of the collection. Records partition by the
/// level component of their niveau (L1 when unparseable); each partition
/// is sorted by descending cross-term average with a stable tie-break on
/// input order and gets dense ranks 1..N. Department ranks repeat the same
/// scheme per department group inside the level partition.
pub fn rank_cohort(records: &[StudentAcademicRecord]) -> Vec<RankedStudent> {
    let averages: Vec<f64> = records.iter().map(cross_term_average).collect();

    let mut out: Vec<RankedStudent> = Vec::with_capacity(records.len());
    let mut global = 0i64;

    for level in [Level::L3, Level::L2, Level::L1] {
        let mut partition: Vec<usize> = (0..records.len())
            .filter(|i| record_level(&records[*i]) == level)
            .collect();
        partition.sort_by(|a, b| {
            averages[*b]
                .partial_cmp(&averages[*a])
                .unwrap_or(Ordering::Equal)
        });

        let mut department_counters: BTreeMap<String, i64> = BTreeMap::new();
        for (pos, idx) in partition.iter().enumerate() {
            let record = &records[*idx];
            global += 1;
            let department_rank = {
                let counter = department_counters
                    .entry(record.department.clone())
                    .or_insert(0);
                *counter += 1;
                *counter
            };
            out.push(RankedStudent {
                matricule: record.matricule,
                prenom: record.prenom.clone(),
                nom: record.nom.clone(),
                department: record.department.clone(),
                niveau: level.as_str().to_string(),
                moyenne: averages[*idx],
                rang: global,
                rang_niveau: pos as i64 + 1,
                rang_department: department_rank,
            });
        }
    }

    out
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsFilters {
    pub semester: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
}

pub fn parse_stats_filters(raw: &serde_json::Value) -> Result<StatsFilters, String> {
    let mut filters = StatsFilters::default();
    for (key, slot) in [
        ("semester", &mut filters.semester),
        ("department", &mut filters.department),
        ("year", &mut filters.year),
    ] {
        match raw.get(key) {
            None => {}
            Some(v) if v.is_null() => {}
            Some(v) => match v.as_str() {
                Some(s) if !s.trim().is_empty() => *slot = Some(s.trim().to_string()),
                Some(_) => {}
                None => return Err(format!("{key} must be a string")),
            },
        }
    }
    if let Some(year) = &filters.year {
        if !crate::record::is_academic_year(year) {
            return Err("year must be in format YYYY-YYYY".to_string());
        }
    }
    Ok(filters)
}

/// Snapshot filter with the store's lookup semantics: department equality,
/// semester presence, and year matched inside the named semester (or any
/// semester when no semester filter is given).
pub fn filter_records<'a>(
    records: &'a [StudentAcademicRecord],
    filters: &StatsFilters,
) -> Vec<&'a StudentAcademicRecord> {
    records
        .iter()
        .filter(|record| {
            if let Some(department) = &filters.department {
                if &record.department != department {
                    return false;
                }
            }
            match (&filters.semester, &filters.year) {
                (Some(semester), year) => match record.semesters.get(semester) {
                    Some(block) => year.as_deref().map_or(true, |y| block.academic_year == y),
                    None => false,
                },
                (None, Some(year)) => record
                    .semesters
                    .values()
                    .any(|block| &block.academic_year == year),
                (None, None) => true,
            }
        })
        .collect()
}

pub const HISTOGRAM_BUCKETS: usize = 21;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBucket {
    pub average: i64,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_students: usize,
    pub passed: usize,
    pub failed: usize,
    pub rattrapage: usize,
    pub passed_percentage: f64,
    pub failed_percentage: f64,
    pub rattrapage_percentage: f64,
    pub average_distribution: Vec<DistributionBucket>,
    pub total_average: f64,
}

fn select_block<'a>(
    record: &'a StudentAcademicRecord,
    filters: &StatsFilters,
) -> Option<&'a SemesterBlock> {
    match &filters.semester {
        Some(semester) => record.semesters.get(semester),
        None => record.semesters.values().next(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Passed,
    Rattrapage,
    Failed,
}

/// Classify one term: decision text wins over the numeric fallback, and an
/// admission keyword wins over a makeup keyword.
fn classify(block: &SemesterBlock) -> Outcome {
    let decision = block
        .decision
        .as_deref()
        .map(|d| d.to_ascii_uppercase())
        .unwrap_or_default();
    if decision.contains("ADMIS") {
        return Outcome::Passed;
    }
    if decision.contains("RATTRAPAGE") {
        return Outcome::Rattrapage;
    }

    let average = block.moyenne_generale;
    let credits = block.credit_total;
    if average >= 10.0 && credits >= 30 {
        Outcome::Passed
    } else if average < 10.0 && credits < 30 {
        Outcome::Rattrapage
    } else {
        Outcome::Failed
    }
}

/// Pass/fail/rattrapage distribution plus a fixed 21-bucket histogram of
/// rounded averages over the filtered population. Bucket percentages are
/// relative to the count of usable averages, not the total population.
pub fn compute_statistics(
    records: &[StudentAcademicRecord],
    filters: &StatsFilters,
) -> Statistics {
    let selected = filter_records(records, filters);
    if selected.is_empty() {
        return Statistics::default();
    }

    let total_students = selected.len();
    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut rattrapage = 0usize;
    let mut bucket_counts = [0usize; HISTOGRAM_BUCKETS];
    let mut average_sum = 0.0;
    let mut average_count = 0usize;

    for record in selected {
        let Some(block) = select_block(record, filters) else {
            continue;
        };

        let average = block.moyenne_generale;
        if average >= 0.0 {
            let bucket = (average.round() as i64).clamp(0, 20) as usize;
            bucket_counts[bucket] += 1;
            average_sum += average;
            average_count += 1;
        }

        match classify(block) {
            Outcome::Passed => passed += 1,
            Outcome::Rattrapage => rattrapage += 1,
            Outcome::Failed => failed += 1,
        }
    }

    let population = total_students as f64;
    let average_distribution = bucket_counts
        .iter()
        .enumerate()
        .map(|(i, count)| DistributionBucket {
            average: i as i64,
            count: *count,
            percentage: if average_count > 0 {
                round2(*count as f64 / average_count as f64 * 100.0)
            } else {
                0.0
            },
        })
        .collect();

    Statistics {
        total_students,
        passed,
        failed,
        rattrapage,
        passed_percentage: round2(passed as f64 / population * 100.0),
        failed_percentage: round2(failed as f64 / population * 100.0),
        rattrapage_percentage: round2(rattrapage as f64 / population * 100.0),
        average_distribution,
        total_average: if average_count > 0 {
            round2(average_sum / average_count as f64)
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(
        matricule: i64,
        department: &str,
        niveau: Option<&str>,
        semesters: &[(&str, &str, f64, i64, Option<&str>)],
    ) -> StudentAcademicRecord {
        let mut rec = StudentAcademicRecord::new(matricule, "2025-01-01T00:00:00Z");
        rec.department = department.to_string();
        rec.niveau = niveau.map(str::to_string);
        for (code, year, moyenne, credits, decision) in semesters {
            rec.semesters.insert(
                code.to_string(),
                SemesterBlock {
                    academic_year: year.to_string(),
                    moyenne_generale: *moyenne,
                    credit_total: *credits,
                    decision: decision.map(str::to_string),
                    ..Default::default()
                },
            );
        }
        rec
    }

    #[test]
    fn cross_term_average_skips_non_positive_terms() {
        let rec = record(
            1,
            "DSI",
            None,
            &[
                ("S1", "2023-2024", 12.0, 30, None),
                ("S2", "2023-2024", 0.0, 0, None),
                ("S3", "2024-2025", 14.0, 30, None),
            ],
        );
        assert_eq!(cross_term_average(&rec), 13.0);

        let empty = record(2, "DSI", None, &[("S1", "2023-2024", 0.0, 0, None)]);
        assert_eq!(cross_term_average(&empty), 0.0);
    }

    #[test]
    fn ranks_are_dense_within_each_partition() {
        let records = vec![
            record(1, "DSI", Some("L1–2023-2024"), &[("S1", "2023-2024", 9.0, 20, None)]),
            record(2, "DSI", Some("L2–2024-2025"), &[("S3", "2024-2025", 13.0, 30, None)]),
            record(3, "GI", Some("L1–2023-2024"), &[("S1", "2023-2024", 12.0, 30, None)]),
            record(4, "DSI", Some("L2–2024-2025"), &[("S3", "2024-2025", 11.0, 30, None)]),
            record(5, "GI", Some("L1–2023-2024"), &[("S1", "2023-2024", 10.0, 24, None)]),
        ];
        let ranked = rank_cohort(&records);

        let l2: Vec<&RankedStudent> = ranked.iter().filter(|r| r.niveau == "L2").collect();
        let l1: Vec<&RankedStudent> = ranked.iter().filter(|r| r.niveau == "L1").collect();

        let l2_ranks: Vec<i64> = l2.iter().map(|r| r.rang_niveau).collect();
        assert_eq!(l2_ranks, vec![1, 2]);
        let l1_ranks: Vec<i64> = l1.iter().map(|r| r.rang_niveau).collect();
        assert_eq!(l1_ranks, vec![1, 2, 3]);

        // Global sequence: every L2 record precedes every L1 record.
        let globals: Vec<i64> = ranked.iter().map(|r| r.rang).collect();
        assert_eq!(globals, vec![1, 2, 3, 4, 5]);
        assert_eq!(ranked[0].matricule, 2);
        assert_eq!(ranked[1].matricule, 4);
        assert_eq!(ranked[2].matricule, 3);
    }

    #[test]
    fn department_ranks_are_independent_per_group() {
        let records = vec![
            record(1, "DSI", Some("L1–2023-2024"), &[("S1", "2023-2024", 9.0, 20, None)]),
            record(3, "GI", Some("L1–2023-2024"), &[("S1", "2023-2024", 12.0, 30, None)]),
            record(5, "GI", Some("L1–2023-2024"), &[("S1", "2023-2024", 10.0, 24, None)]),
        ];
        let ranked = rank_cohort(&records);
        let by_matricule = |m: i64| ranked.iter().find(|r| r.matricule == m).expect("ranked");
        assert_eq!(by_matricule(3).rang_department, 1);
        assert_eq!(by_matricule(5).rang_department, 2);
        assert_eq!(by_matricule(1).rang_department, 1);
    }

    #[test]
    fn unparseable_niveau_ranks_as_l1() {
        let records = vec![
            record(1, "DSI", None, &[("S1", "2023-2024", 12.0, 30, None)]),
            record(2, "DSI", Some("junk"), &[("S1", "2023-2024", 14.0, 30, None)]),
        ];
        let ranked = rank_cohort(&records);
        assert!(ranked.iter().all(|r| r.niveau == "L1"));
        assert_eq!(ranked[0].matricule, 2);
    }

    #[test]
    fn stable_tie_break_on_input_order() {
        let records = vec![
            record(7, "DSI", None, &[("S1", "2023-2024", 12.0, 30, None)]),
            record(8, "DSI", None, &[("S1", "2023-2024", 12.0, 30, None)]),
        ];
        let ranked = rank_cohort(&records);
        assert_eq!(ranked[0].matricule, 7);
        assert_eq!(ranked[1].matricule, 8);
    }

    #[test]
    fn statistics_scenario_with_decision_override() {
        // Averages 16, 9, 5, 11; the 5 carries an explicit RATTRAPAGE.
        let records = vec![
            record(1, "DSI", None, &[("S3", "2024-2025", 16.0, 30, None)]),
            record(2, "DSI", None, &[("S3", "2024-2025", 9.0, 30, None)]),
            record(3, "DSI", None, &[("S3", "2024-2025", 5.0, 10, Some("RATTRAPAGE"))]),
            record(4, "DSI", None, &[("S3", "2024-2025", 11.0, 30, None)]),
        ];
        let filters = StatsFilters {
            semester: Some("S3".to_string()),
            ..Default::default()
        };
        let stats = compute_statistics(&records, &filters);

        assert_eq!(stats.total_students, 4);
        assert_eq!(stats.passed, 2);
        assert_eq!(stats.rattrapage, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.passed_percentage, 50.0);
        assert_eq!(stats.rattrapage_percentage, 25.0);
        assert_eq!(stats.failed_percentage, 25.0);
        assert_eq!(stats.total_average, round2((16.0 + 9.0 + 5.0 + 11.0) / 4.0));
    }

    #[test]
    fn admission_keyword_beats_numeric_fallback() {
        let rec = record(
            1,
            "DSI",
            None,
            &[("S3", "2024-2025", 8.0, 10, Some("ADMIS SESSION 2"))],
        );
        let stats = compute_statistics(&[rec], &StatsFilters::default());
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.rattrapage, 0);
    }

    #[test]
    fn histogram_counts_sum_to_usable_averages() {
        let records = vec![
            record(1, "DSI", None, &[("S3", "2024-2025", 16.4, 30, None)]),
            record(2, "DSI", None, &[("S3", "2024-2025", 9.6, 30, None)]),
            record(3, "DSI", None, &[("S3", "2024-2025", 25.0, 30, None)]),
            // No S3: excluded from the histogram, counted in the total.
            record(4, "DSI", None, &[("S1", "2023-2024", 12.0, 30, None)]),
        ];
        let filters = StatsFilters {
            semester: Some("S3".to_string()),
            ..Default::default()
        };
        // Record 4 is filtered out entirely by the semester filter.
        let stats = compute_statistics(&records, &filters);

        assert_eq!(stats.average_distribution.len(), HISTOGRAM_BUCKETS);
        let total: usize = stats.average_distribution.iter().map(|b| b.count).sum();
        assert_eq!(total, 3);
        assert_eq!(stats.average_distribution[16].count, 1);
        assert_eq!(stats.average_distribution[10].count, 1);
        // Out-of-scale averages clamp into the top bucket.
        assert_eq!(stats.average_distribution[20].count, 1);
    }

    #[test]
    fn filters_match_department_semester_and_year() {
        let records = vec![
            record(1, "DSI", None, &[("S3", "2024-2025", 12.0, 30, None)]),
            record(2, "GI", None, &[("S3", "2024-2025", 12.0, 30, None)]),
            record(3, "DSI", None, &[("S3", "2023-2024", 12.0, 30, None)]),
            record(4, "DSI", None, &[("S1", "2024-2025", 12.0, 30, None)]),
        ];

        let filters = StatsFilters {
            semester: Some("S3".to_string()),
            department: Some("DSI".to_string()),
            year: Some("2024-2025".to_string()),
        };
        let hits = filter_records(&records, &filters);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matricule, 1);

        let year_only = StatsFilters {
            year: Some("2024-2025".to_string()),
            ..Default::default()
        };
        let hits = filter_records(&records, &year_only);
        let keys: Vec<i64> = hits.iter().map(|r| r.matricule).collect();
        assert_eq!(keys, vec![1, 2, 4]);
    }

    #[test]
    fn empty_population_yields_default_statistics() {
        let stats = compute_statistics(&[], &StatsFilters::default());
        assert_eq!(stats.total_students, 0);
        assert!(stats.average_distribution.is_empty());
        assert_eq!(stats.total_average, 0.0);
    }

    #[test]
    fn parse_filters_validates_year() {
        let filters = parse_stats_filters(&json!({
            "semester": "S3",
            "department": null,
            "year": "2024-2025"
        }))
        .expect("filters");
        assert_eq!(filters.semester.as_deref(), Some("S3"));
        assert_eq!(filters.department, None);

        assert!(parse_stats_filters(&json!({ "year": "2024" })).is_err());
        assert!(parse_stats_filters(&json!({ "semester": 3 })).is_err());
    }
}

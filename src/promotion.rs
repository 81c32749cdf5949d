use crate::record::{semester_number, SemesterBlock};
use std::collections::BTreeMap;

/// Level component of the niveau tag, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    L1,
    L2,
    L3,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::L1 => "L1",
            Level::L2 => "L2",
            Level::L3 => "L3",
        }
    }

    pub fn parse(s: &str) -> Option<Level> {
        match s {
            "L1" => Some(Level::L1),
            "L2" => Some(Level::L2),
            "L3" => Some(Level::L3),
            _ => None,
        }
    }

    /// Nominal level implied by a semester number alone.
    fn nominal(semester: u32) -> Level {
        match semester {
            1 | 2 => Level::L1,
            3 | 4 => Level::L2,
            _ => Level::L3,
        }
    }
}

/// Niveau tags are "<Level>–<AcademicYear>", e.g. "L2–2025-2026".
pub const NIVEAU_SEPARATOR: char = '–';

pub fn format_niveau(level: Level, year: &str) -> String {
    format!("{}{}{}", level.as_str(), NIVEAU_SEPARATOR, year)
}

/// Unparseable tags degrade to L1 with no year, never to an error.
pub fn parse_niveau(niveau: &str) -> (Level, Option<&str>) {
    match niveau.split_once(NIVEAU_SEPARATOR) {
        Some((level, year)) => (Level::parse(level).unwrap_or(Level::L1), Some(year)),
        None => (Level::parse(niveau).unwrap_or(Level::L1), None),
    }
}

/// "2024-2025" -> "2025-2026". Malformed years pass through unchanged.
pub fn following_year(year: &str) -> String {
    let parsed = year
        .split_once('-')
        .and_then(|(a, b)| Some((a.parse::<i32>().ok()?, b.parse::<i32>().ok()?)));
    match parsed {
        Some((start, end)) => format!("{}-{}", start + 1, end + 1),
        None => year.to_string(),
    }
}

fn average_of(a: &SemesterBlock, b: &SemesterBlock) -> f64 {
    (a.moyenne_generale + b.moyenne_generale) / 2.0
}

/// Evaluate the promotion transitions for one semester ingestion.
///
/// Pure function of the current niveau tag, the incoming semester code and
/// year, and the record's semester map (which must already include the
/// incoming semester). Returns the new tag to store, or None when nothing
/// changes. The stored level never decreases; at equal level only the year
/// is retagged.
pub fn evaluate(
    current: Option<&str>,
    semester: &str,
    year: &str,
    semesters: &BTreeMap<String, SemesterBlock>,
) -> Option<String> {
    let number = semester_number(semester)?;

    let candidate = match semester {
        "S2" => match (semesters.get("S1"), semesters.get("S2")) {
            (Some(s1), Some(s2)) => {
                let credits = s1.credit_total + s2.credit_total;
                if average_of(s1, s2) >= 10.0 && credits >= 39 {
                    (Level::L2, following_year(year))
                } else {
                    (Level::L1, year.to_string())
                }
            }
            _ => (Level::nominal(number), year.to_string()),
        },
        "S4" => {
            let all = (
                semesters.get("S1"),
                semesters.get("S2"),
                semesters.get("S3"),
                semesters.get("S4"),
            );
            match all {
                (Some(s1), Some(s2), Some(s3), Some(s4)) => {
                    let lower_credits = s1.credit_total + s2.credit_total;
                    let upper_credits = s3.credit_total + s4.credit_total;
                    if average_of(s3, s4) >= 10.0 && lower_credits >= 39 && upper_credits >= 60 {
                        (Level::L3, following_year(year))
                    } else {
                        (Level::L2, year.to_string())
                    }
                }
                _ => (Level::nominal(number), year.to_string()),
            }
        }
        _ => (Level::nominal(number), year.to_string()),
    };

    let (cand_level, cand_year) = candidate;
    let Some(current) = current else {
        return Some(format_niveau(cand_level, &cand_year));
    };
    let (cur_level, cur_year) = parse_niveau(current);

    if cand_level > cur_level {
        Some(format_niveau(cand_level, &cand_year))
    } else if cand_level < cur_level {
        None
    } else if cur_year != Some(cand_year.as_str()) {
        Some(format_niveau(cand_level, &cand_year))
    } else {
        None
    }
}

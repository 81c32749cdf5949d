use crate::grid::{self, Grid};
use std::fmt;

// Exported PV sheets share a fixed header geometry; only the column layout
// of modules and subjects varies from sheet to sheet.
pub const SEMESTER_ROW: usize = 0;
pub const SEMESTER_COL: usize = 1;
pub const MODULE_HEADER_ROW: usize = 1;
pub const COEF_ROW: usize = 3;
pub const SUBJECT_HEADER_ROW: usize = 4;
pub const SUMMARY_HEADER_ROW: usize = 5;
pub const DATA_START_ROW: usize = 6;
pub const MODULE_SCAN_START_COL: usize = 4;

pub const DEPARTMENT_COL: usize = 0;
pub const MATRICULE_COL: usize = 1;
pub const PRENOM_COL: usize = 2;
pub const NOM_COL: usize = 3;

/// A subject block is exactly five columns: NCC, NSN, NSR, Moy, Capit.
pub const SUBJECT_BLOCK_WIDTH: usize = 5;

/// Structural expectations unmet during detection. Fatal to the whole
/// parse; no partial layout is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    SemesterCell(String),
    NoModules,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::SemesterCell(got) => {
                write!(f, "semester number cell is not a positive integer: {got}")
            }
            LayoutError::NoModules => write!(f, "no module headers found on the sheet"),
        }
    }
}

impl std::error::Error for LayoutError {}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectSpan {
    pub code: String,
    pub name: String,
    pub coef: f64,
    pub start_col: usize,
}

impl SubjectSpan {
    pub fn last_col(&self) -> usize {
        self.start_col + SUBJECT_BLOCK_WIDTH - 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSpan {
    pub code: String,
    pub name: String,
    pub start_col: usize,
    pub end_col: usize,
    pub subjects: Vec<SubjectSpan>,
    pub moyenne_col: Option<usize>,
    pub ue_valide_col: Option<usize>,
}

/// Declarative column map for one sheet. All heuristics live in `detect`;
/// extraction consumes the map without re-inspecting headers.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub semester: String,
    pub modules: Vec<ModuleSpan>,
    pub moyenne_generale_col: Option<usize>,
    pub credit_total_col: Option<usize>,
    pub decision_col: Option<usize>,
}

/// A module or subject header cell is "CODE:Name".
fn split_code_header(cell: &serde_json::Value) -> Option<(String, String)> {
    let raw = match cell {
        serde_json::Value::String(s) => s,
        _ => return None,
    };
    let (code, name) = raw.split_once(':')?;
    Some((code.trim().to_string(), name.trim().to_string()))
}

pub fn detect(grid: &Grid) -> Result<SheetLayout, LayoutError> {
    let width = grid.width();

    let semester_cell = grid.cell(SEMESTER_ROW, SEMESTER_COL);
    let semester = match grid::integer(semester_cell) {
        Some(n) if n > 0 => format!("S{n}"),
        _ => return Err(LayoutError::SemesterCell(semester_cell.to_string())),
    };

    // Module spans: left-to-right scan of the module header row. Each span
    // runs to the column before the next match; the final one stops short
    // of the sheet's trailing summary columns.
    let mut starts: Vec<(String, String, usize)> = Vec::new();
    for col in MODULE_SCAN_START_COL..width {
        if let Some((code, name)) = split_code_header(grid.cell(MODULE_HEADER_ROW, col)) {
            starts.push((code, name, col));
        }
    }
    if starts.is_empty() {
        return Err(LayoutError::NoModules);
    }

    let mut modules: Vec<ModuleSpan> = Vec::with_capacity(starts.len());
    for i in 0..starts.len() {
        let (code, name, start_col) = starts[i].clone();
        let end_col = if i + 1 < starts.len() {
            starts[i + 1].2 - 1
        } else {
            width.saturating_sub(2).max(start_col)
        };

        // Subject blocks: five-column strides anchored on a code:name
        // subject header. Non-matching columns advance one at a time.
        let mut subjects: Vec<SubjectSpan> = Vec::new();
        let mut col = start_col;
        while col <= end_col {
            match split_code_header(grid.cell(SUBJECT_HEADER_ROW, col)) {
                Some((s_code, s_name)) => {
                    let coef = grid::number_or_zero(grid.cell(COEF_ROW, col));
                    subjects.push(SubjectSpan {
                        code: s_code,
                        name: s_name,
                        coef,
                        start_col: col,
                    });
                    col += SUBJECT_BLOCK_WIDTH;
                }
                None => col += 1,
            }
        }

        let (moyenne_col, ue_valide_col) =
            locate_module_summary(grid, start_col, end_col, subjects.last());

        modules.push(ModuleSpan {
            code,
            name,
            start_col,
            end_col,
            subjects,
            moyenne_col,
            ue_valide_col,
        });
    }

    // Global summary columns are keyword-located across the whole header
    // row, independent of module boundaries.
    let mut moyenne_generale_col = None;
    let mut credit_total_col = None;
    let mut decision_col = None;
    for col in 0..width {
        let Some(header) = grid::text(grid.cell(SUMMARY_HEADER_ROW, col)) else {
            continue;
        };
        let upper = header.to_ascii_uppercase();
        if upper.contains("MOY GENERAL") || upper.contains("MOYENNE GENERAL") {
            moyenne_generale_col = Some(col);
        } else if upper.contains("CREDIT TOTAL") || upper.contains("CREDIT TOT") {
            credit_total_col = Some(col);
        } else if upper.contains("DECISION") {
            decision_col = Some(col);
        }
    }

    Ok(SheetLayout {
        semester,
        modules,
        moyenne_generale_col,
        credit_total_col,
        decision_col,
    })
}

/// Per-module summary columns ("MOYENNE UE", "UE VALIDE") live somewhere
/// after the last subject block. If only the validity header is found, the
/// average sits in the column to its left; if neither is found, the two
/// columns after the last subject block are assumed.
fn locate_module_summary(
    grid: &Grid,
    start_col: usize,
    end_col: usize,
    last_subject: Option<&SubjectSpan>,
) -> (Option<usize>, Option<usize>) {
    let Some(last_subject) = last_subject else {
        return (None, None);
    };

    let mut moyenne_col: Option<usize> = None;
    let mut ue_valide_col: Option<usize> = None;

    let search_end = (end_col + SUBJECT_BLOCK_WIDTH).min(grid.width());
    for col in start_col..search_end {
        let Some(header) = grid::text(grid.cell(SUMMARY_HEADER_ROW, col)) else {
            continue;
        };
        let upper = header.to_ascii_uppercase();
        if upper.contains("MOYENNE UE") && moyenne_col.is_none() {
            moyenne_col = Some(col);
        } else if upper.contains("UE VALID") {
            ue_valide_col = Some(col);
            if moyenne_col.is_none() {
                moyenne_col = col.checked_sub(1);
            }
            break;
        }
    }

    let moyenne_col = moyenne_col.unwrap_or(last_subject.last_col() + 1);
    let ue_valide_col = ue_valide_col.unwrap_or(moyenne_col + 1);
    (Some(moyenne_col), Some(ue_valide_col))
}

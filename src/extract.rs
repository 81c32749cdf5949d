use crate::grid::{self, Grid};
use crate::layout::{self, SheetLayout};
use crate::record::{ModuleBlock, SemesterBlock, Subject, SubjectNotes, TriState};
use std::collections::BTreeMap;

/// One data row of a sheet, lifted into the record shape. Identity fields
/// come from the fixed columns; the semester block follows the column map.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedStudent {
    pub matricule: i64,
    pub department: Option<String>,
    pub prenom: Option<String>,
    pub nom: Option<String>,
    pub semester: String,
    pub block: SemesterBlock,
}

/// Walk the data rows of `grid` using a detected layout. Rows with a
/// blank or unparseable matricule produce nothing (silent skip, not an
/// error). Output preserves sheet row order; single-sheet ranks are
/// assigned before returning.
pub fn extract(grid: &Grid, sheet: &SheetLayout, year: &str) -> Vec<ExtractedStudent> {
    let mut students: Vec<ExtractedStudent> = Vec::new();

    for row in layout::DATA_START_ROW..grid.height() {
        let Some(matricule) = grid::integer(grid.cell(row, layout::MATRICULE_COL)) else {
            continue;
        };

        let mut modules: BTreeMap<String, ModuleBlock> = BTreeMap::new();
        for span in &sheet.modules {
            let mut matieres: BTreeMap<String, Subject> = BTreeMap::new();
            for subject in &span.subjects {
                let c = subject.start_col;
                let notes = SubjectNotes {
                    controle_continu: grid::number_or_zero(grid.cell(row, c)),
                    session_normale: grid::number_or_zero(grid.cell(row, c + 1)),
                    session_rattrapage: grid::number_or_zero(grid.cell(row, c + 2)),
                    moyenne: grid::number_or_zero(grid.cell(row, c + 3)),
                    capitalise: grid::tri_state(grid.cell(row, c + 4)),
                };
                matieres.insert(
                    subject.code.clone(),
                    Subject {
                        name: subject.name.clone(),
                        coef: subject.coef,
                        notes,
                    },
                );
            }

            let moyenne = span
                .moyenne_col
                .map(|c| grid::number_or_zero(grid.cell(row, c)))
                .unwrap_or(0.0);
            let ue_valide = span
                .ue_valide_col
                .map(|c| grid::tri_state(grid.cell(row, c)))
                .unwrap_or(TriState::Unknown);

            modules.insert(
                span.code.clone(),
                ModuleBlock {
                    name: span.name.clone(),
                    moyenne,
                    ue_valide,
                    matieres,
                },
            );
        }

        let moyenne_generale = sheet
            .moyenne_generale_col
            .map(|c| grid::number_or_zero(grid.cell(row, c)))
            .unwrap_or(0.0);
        let credit_total = sheet
            .credit_total_col
            .and_then(|c| grid::integer(grid.cell(row, c)))
            .unwrap_or(0);
        let decision = sheet
            .decision_col
            .and_then(|c| grid::text(grid.cell(row, c)));

        students.push(ExtractedStudent {
            matricule,
            department: grid::text(grid.cell(row, layout::DEPARTMENT_COL)),
            prenom: grid::text(grid.cell(row, layout::PRENOM_COL)),
            nom: grid::text(grid.cell(row, layout::NOM_COL)),
            semester: sheet.semester.clone(),
            block: SemesterBlock {
                academic_year: year.to_string(),
                is_public: false,
                moyenne_generale,
                credit_total,
                decision,
                rang_general: None,
                rang_department: None,
                modules,
            },
        });
    }

    assign_sheet_ranks(&mut students);
    students
}

/// Single-sheet ranks, computed once at ingestion time: a whole-sheet rank
/// and a department-scoped rank, both by descending general average with a
/// stable tie-break on row order. Ranks are 1..N with no gaps.
fn assign_sheet_ranks(students: &mut [ExtractedStudent]) {
    let mut order: Vec<usize> = (0..students.len()).collect();
    sort_desc_by_average(&mut order, students);
    for (rank, idx) in order.iter().enumerate() {
        students[*idx].block.rang_general = Some(rank as i64 + 1);
    }

    let mut by_department: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, s) in students.iter().enumerate() {
        by_department
            .entry(s.department.clone().unwrap_or_default())
            .or_default()
            .push(idx);
    }
    for (_, mut group) in by_department {
        sort_desc_by_average(&mut group, students);
        for (rank, idx) in group.iter().enumerate() {
            students[*idx].block.rang_department = Some(rank as i64 + 1);
        }
    }
}

fn sort_desc_by_average(indexes: &mut [usize], students: &[ExtractedStudent]) {
    indexes.sort_by(|a, b| {
        let ma = students[*a].block.moyenne_generale;
        let mb = students[*b].block.moyenne_generale;
        mb.partial_cmp(&ma).unwrap_or(std::cmp::Ordering::Equal)
    });
}

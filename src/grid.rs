use crate::record::TriState;
use serde_json::Value;

/// An in-memory rectangular sheet of cells, decoupled from whatever
/// spreadsheet encoding produced it. Cells arrive as JSON scalars; reads
/// outside the populated area behave like blank cells.
#[derive(Debug, Clone)]
pub struct Grid {
    rows: Vec<Vec<Value>>,
    width: usize,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        Grid { rows, width }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn cell(&self, row: usize, col: usize) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&Value::Null)
    }
}

/// Locale-aware numeric coercion: exported sheets mix real numbers with
/// comma-decimal text like "11,01". Blank and unparseable cells are None.
pub fn number(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return None;
            }
            t.replace(',', ".").parse::<f64>().ok()
        }
        _ => None,
    }
}

pub fn number_or_zero(cell: &Value) -> f64 {
    number(cell).unwrap_or(0.0)
}

/// Integer coercion tolerating float text ("35", "35.0", "35,0" all parse).
pub fn integer(cell: &Value) -> Option<i64> {
    match cell {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(_) => number(cell).map(|f| f as i64),
        _ => None,
    }
}

pub fn text(cell: &Value) -> Option<String> {
    match cell {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Tri-state coercion for validation/capitalization indicator cells.
/// Blank stays Unknown; "NON" / "NV" / "Non Valide" style text means no.
pub fn tri_state(cell: &Value) -> TriState {
    match cell {
        Value::Bool(b) => TriState::from_bool(*b),
        Value::Number(n) => TriState::from_bool(n.as_f64().unwrap_or(0.0) != 0.0),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                TriState::Unknown
            } else {
                TriState::from_bool(!t.to_ascii_uppercase().starts_with('N'))
            }
        }
        _ => TriState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_accepts_comma_decimals() {
        assert_eq!(number(&json!("11,01")), Some(11.01));
        assert_eq!(number(&json!("11.5")), Some(11.5));
        assert_eq!(number(&json!(12.25)), Some(12.25));
        assert_eq!(number(&json!("  ")), None);
        assert_eq!(number(&json!(null)), None);
        assert_eq!(number(&json!("abc")), None);
        assert_eq!(number_or_zero(&json!("abc")), 0.0);
    }

    #[test]
    fn integer_truncates_float_text() {
        assert_eq!(integer(&json!("35")), Some(35));
        assert_eq!(integer(&json!("35,0")), Some(35));
        assert_eq!(integer(&json!(35.7)), Some(35));
        assert_eq!(integer(&json!(null)), None);
        assert_eq!(integer(&json!("x")), None);
    }

    #[test]
    fn tri_state_distinguishes_blank_from_no() {
        assert_eq!(tri_state(&json!(null)), TriState::Unknown);
        assert_eq!(tri_state(&json!("")), TriState::Unknown);
        assert_eq!(tri_state(&json!("NON")), TriState::False);
        assert_eq!(tri_state(&json!("nv")), TriState::False);
        assert_eq!(tri_state(&json!("OUI")), TriState::True);
        assert_eq!(tri_state(&json!("V")), TriState::True);
        assert_eq!(tri_state(&json!(0)), TriState::False);
        assert_eq!(tri_state(&json!(1)), TriState::True);
        assert_eq!(tri_state(&json!(true)), TriState::True);
    }

    #[test]
    fn out_of_range_reads_are_blank() {
        let g = Grid::new(vec![vec![json!("a"), json!("b")], vec![json!("c")]]);
        assert_eq!(g.width(), 2);
        assert_eq!(g.height(), 2);
        assert_eq!(g.cell(1, 1), &Value::Null);
        assert_eq!(g.cell(9, 9), &Value::Null);
        assert_eq!(text(g.cell(0, 1)).as_deref(), Some("b"));
    }
}

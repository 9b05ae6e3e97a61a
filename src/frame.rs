use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single table cell. The warehouse hands back loosely typed rows; pinning
/// the scalar kinds here keeps the wire encoding deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    /// Numeric view of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Epoch seconds for comparable cells: timestamps convert, numbers pass
    /// through as already-converted epochs.
    pub fn epoch_seconds(&self) -> Option<f64> {
        match self {
            Cell::Timestamp(t) => Some(timestamp_to_epoch(t)),
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

/// Fractional epoch seconds with microsecond resolution.
pub fn timestamp_to_epoch(t: &DateTime<Utc>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_micros()) / 1e6
}

/// An ordered collection of named, equal-length columns. Column order is
/// significant and preserved end to end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<(String, Vec<Cell>)>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a one-column frame, the shape used for catalog listings.
    pub fn single_column(name: impl Into<String>, values: Vec<Cell>) -> Self {
        let mut frame = Self::new();
        frame.push_column(name, values);
        frame
    }

    /// Append a column. Replaces an existing column of the same name in place,
    /// keeping its original position.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Cell>) {
        let name = name.into();
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = values;
        } else {
            self.columns.push((name, values));
        }
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Row count, taken from the first column.
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|(_, v)| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<Cell>> {
        self.columns
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Cell])> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<Cell>)> {
        self.columns.iter_mut().map(|(n, v)| (n.as_str(), v))
    }

    /// Numeric values of one column, skipping non-numeric cells.
    pub fn numeric_values(&self, name: &str) -> Vec<f64> {
        self.column(name)
            .map(|cells| cells.iter().filter_map(Cell::as_f64).collect())
            .unwrap_or_default()
    }

    /// Restrict to the named columns, in the requested order, capped at
    /// `row_cap` rows (0 means unbounded). Unknown names are skipped.
    pub fn select(&self, names: &[String], row_cap: usize) -> Frame {
        let mut out = Frame::new();
        for name in names {
            if let Some(cells) = self.column(name) {
                let take = if row_cap == 0 {
                    cells.len()
                } else {
                    row_cap.min(cells.len())
                };
                out.push_column(name.clone(), cells[..take].to_vec());
            }
        }
        out
    }

    /// Convert to the split-orientation wire shape.
    pub fn to_split(&self) -> SplitFrame {
        let n_rows = self.n_rows();
        let mut data = Vec::with_capacity(n_rows);
        for row in 0..n_rows {
            let mut cells = Vec::with_capacity(self.columns.len());
            for (_, values) in &self.columns {
                cells.push(values.get(row).cloned().unwrap_or(Cell::Null));
            }
            data.push(cells);
        }
        SplitFrame {
            columns: self.column_names().map(str::to_owned).collect(),
            data,
        }
    }
}

/// Split-orientation table encoding: parallel column-name list and row-major
/// values, the shape the frontend consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitFrame {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Cell>>,
}

impl SplitFrame {
    /// Transpose back into the column-major frame.
    pub fn into_frame(self) -> Frame {
        let mut frame = Frame::new();
        for (idx, name) in self.columns.into_iter().enumerate() {
            let values = self
                .data
                .iter()
                .map(|row| row.get(idx).cloned().unwrap_or(Cell::Null))
                .collect();
            frame.push_column(name, values);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn numbers(values: &[f64]) -> Vec<Cell> {
        values.iter().copied().map(Cell::Number).collect()
    }

    #[test]
    fn split_is_row_major_and_ordered() {
        let mut frame = Frame::new();
        frame.push_column("a", numbers(&[1.0, 2.0]));
        frame.push_column("b", numbers(&[3.0, 4.0]));

        let split = frame.to_split();
        assert_eq!(split.columns, vec!["a", "b"]);
        assert_eq!(
            split.data,
            vec![
                vec![Cell::Number(1.0), Cell::Number(3.0)],
                vec![Cell::Number(2.0), Cell::Number(4.0)],
            ]
        );
        assert_eq!(split.into_frame(), frame);
    }

    #[test]
    fn push_column_overwrites_in_place() {
        let mut frame = Frame::new();
        frame.push_column("a", numbers(&[1.0]));
        frame.push_column("b", numbers(&[2.0]));
        frame.push_column("a", numbers(&[9.0]));

        assert_eq!(frame.column_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(frame.column("a"), Some(&[Cell::Number(9.0)][..]));
    }

    #[test]
    fn select_respects_order_and_row_cap() {
        let mut frame = Frame::new();
        frame.push_column("a", numbers(&[1.0, 2.0, 3.0]));
        frame.push_column("b", numbers(&[4.0, 5.0, 6.0]));

        let picked = frame.select(&["b".into(), "missing".into(), "a".into()], 2);
        assert_eq!(picked.column_names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(picked.n_rows(), 2);
        assert_eq!(picked.column("b"), Some(&[Cell::Number(4.0), Cell::Number(5.0)][..]));
    }

    #[test]
    fn cell_wire_forms() {
        let ts = Utc.with_ymd_and_hms(2019, 9, 14, 0, 0, 0).unwrap();
        assert_eq!(serde_json::to_string(&Cell::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Cell::Number(1.5)).unwrap(), "1.5");
        assert_eq!(serde_json::to_string(&Cell::Bool(true)).unwrap(), "true");
        assert_eq!(
            serde_json::to_string(&Cell::Text("x".into())).unwrap(),
            "\"x\""
        );
        assert!(serde_json::to_string(&Cell::Timestamp(ts)).unwrap().starts_with("\"2019-09-14"));
    }

    #[test]
    fn epoch_seconds_passes_numbers_through() {
        let ts = Utc.timestamp_opt(1_568_418_338, 0).unwrap();
        assert_eq!(Cell::Timestamp(ts).epoch_seconds(), Some(1_568_418_338.0));
        assert_eq!(Cell::Number(7.0).epoch_seconds(), Some(7.0));
        assert_eq!(Cell::Text("x".into()).epoch_seconds(), None);
    }
}

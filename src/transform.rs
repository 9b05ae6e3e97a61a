//! Pure shaping transforms applied to fetched frames before they go on the
//! wire: anomaly-window label marking, timestamp-to-epoch conversion, and the
//! [-1, 1] min/max rescale.

use tracing::info;

use crate::frame::{Cell, Frame};

/// Add (or overwrite) `label_column` with 0 for every row, then 1 for rows
/// whose `timestamp_column` value lies inside `[window_start, window_end]`,
/// inclusive on both ends.
pub fn mark_window_label(
    frame: &mut Frame,
    timestamp_column: &str,
    label_column: &str,
    window_start: f64,
    window_end: f64,
) {
    let labels: Vec<Cell> = match frame.column(timestamp_column) {
        Some(cells) => cells
            .iter()
            .map(|cell| {
                let inside = cell
                    .epoch_seconds()
                    .is_some_and(|t| window_start <= t && t <= window_end);
                Cell::Number(if inside { 1.0 } else { 0.0 })
            })
            .collect(),
        None => vec![Cell::Number(0.0); frame.n_rows()],
    };
    frame.push_column(label_column, labels);
}

/// Convert the timestamp cells of one named column to numeric epoch seconds.
/// Cells that are not timestamps are left as they are.
pub fn timestamp_column_to_epoch(frame: &mut Frame, column: &str) {
    if let Some(cells) = frame.column_mut(column) {
        for cell in cells.iter_mut() {
            if let Cell::Timestamp(t) = cell {
                *cell = Cell::Number(crate::frame::timestamp_to_epoch(t));
            }
        }
    }
}

/// Convert every timestamp-bearing column of the frame to epoch seconds.
///
/// A column qualifies if it holds at least one timestamp cell. If such a
/// column also holds text or boolean cells the conversion is abandoned for
/// that column: a diagnostic is logged and the column passes through
/// unmodified. This mirrors the anomaly-table path, where ragged upstream
/// typing is expected and must not fail the request.
pub fn epoch_convert_timestamp_columns(frame: &mut Frame) {
    for (name, cells) in frame.iter_mut() {
        if !cells.iter().any(|c| matches!(c, Cell::Timestamp(_))) {
            continue;
        }
        if cells
            .iter()
            .any(|c| matches!(c, Cell::Text(_) | Cell::Bool(_)))
        {
            info!("can't extract epoch timestamps from column {name}, leaving it unconverted");
            continue;
        }
        for cell in cells.iter_mut() {
            if let Cell::Timestamp(t) = cell {
                *cell = Cell::Number(crate::frame::timestamp_to_epoch(t));
            }
        }
    }
}

/// Per-column min/max aggregate over the numeric cells of every column not in
/// `exclude`, as a two-row frame (row 0 minima, row 1 maxima). Columns with no
/// numeric cells aggregate to nulls.
pub fn column_min_max(frame: &Frame, exclude: &[&str]) -> Frame {
    let mut agg = Frame::new();
    for (name, cells) in frame.iter() {
        if exclude.contains(&name) {
            continue;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut seen = false;
        for v in cells.iter().filter_map(Cell::as_f64) {
            min = min.min(v);
            max = max.max(v);
            seen = true;
        }
        let (lo, hi) = if seen {
            (Cell::Number(min), Cell::Number(max))
        } else {
            (Cell::Null, Cell::Null)
        };
        agg.push_column(name, vec![lo, hi]);
    }
    agg
}

/// Rescale every column not in `exclude` to [-1, 1]:
/// subtract the column minimum, divide by the maximum of the shifted values,
/// then map [0, 1] through `2x - 1`. When the shifted maximum is exactly 0
/// (an all-equal column) the division is skipped and the column rides through
/// the affine map at 0, ending uniformly at -1. Non-numeric cells are left
/// untouched.
pub fn rescale(frame: &mut Frame, exclude: &[&str]) {
    for (name, cells) in frame.iter_mut() {
        if exclude.contains(&name) {
            continue;
        }
        let Some(min) = cells
            .iter()
            .filter_map(Cell::as_f64)
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            })
        else {
            continue;
        };
        for cell in cells.iter_mut() {
            if let Cell::Number(v) = cell {
                *v -= min;
            }
        }
        let shifted_max = cells
            .iter()
            .filter_map(Cell::as_f64)
            .fold(f64::NEG_INFINITY, f64::max);
        if shifted_max != 0.0 {
            for cell in cells.iter_mut() {
                if let Cell::Number(v) = cell {
                    *v /= shifted_max;
                }
            }
        }
        for cell in cells.iter_mut() {
            if let Cell::Number(v) = cell {
                *v = 2.0 * *v - 1.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn numbers(values: &[f64]) -> Vec<Cell> {
        values.iter().copied().map(Cell::Number).collect()
    }

    fn numeric_column(frame: &Frame, name: &str) -> Vec<f64> {
        frame.numeric_values(name)
    }

    #[test]
    fn label_window_is_inclusive_on_both_ends() {
        let mut frame = Frame::single_column("ts", numbers(&[0.0, 5.0, 10.0, 15.0]));
        mark_window_label(&mut frame, "ts", "label", 5.0, 10.0);
        assert_eq!(numeric_column(&frame, "label"), vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn label_marks_timestamp_cells_too() {
        let cells = vec![
            Cell::Timestamp(Utc.timestamp_opt(4, 0).unwrap()),
            Cell::Timestamp(Utc.timestamp_opt(5, 0).unwrap()),
        ];
        let mut frame = Frame::single_column("ts", cells);
        mark_window_label(&mut frame, "ts", "label", 5.0, 10.0);
        assert_eq!(numeric_column(&frame, "label"), vec![0.0, 1.0]);
    }

    #[test]
    fn label_overwrites_existing_column() {
        let mut frame = Frame::single_column("ts", numbers(&[1.0]));
        frame.push_column("label", numbers(&[7.0]));
        mark_window_label(&mut frame, "ts", "label", 0.0, 2.0);
        assert_eq!(numeric_column(&frame, "label"), vec![1.0]);
    }

    #[test]
    fn epoch_conversion_is_per_column_with_fallback() {
        let mut frame = Frame::new();
        frame.push_column(
            "start_ts",
            vec![Cell::Timestamp(Utc.timestamp_opt(100, 500_000_000).unwrap())],
        );
        frame.push_column(
            "mixed",
            vec![
                Cell::Timestamp(Utc.timestamp_opt(1, 0).unwrap()),
                Cell::Text("not a time".into()),
            ],
        );
        frame.push_column("severity", numbers(&[3.0]));
        epoch_convert_timestamp_columns(&mut frame);

        assert_eq!(frame.column("start_ts"), Some(&[Cell::Number(100.5)][..]));
        // mixed column is passed through unconverted
        assert!(matches!(frame.column("mixed").unwrap()[0], Cell::Timestamp(_)));
        assert_eq!(numeric_column(&frame, "severity"), vec![3.0]);
    }

    #[test]
    fn min_max_aggregate_skips_excluded() {
        let mut frame = Frame::new();
        frame.push_column("a", numbers(&[2.0, -1.0, 5.0]));
        frame.push_column("label", numbers(&[0.0, 1.0, 0.0]));
        let agg = column_min_max(&frame, &["label"]);

        assert_eq!(agg.column_names().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(agg.column("a"), Some(&[Cell::Number(-1.0), Cell::Number(5.0)][..]));
    }

    #[test]
    fn rescale_hits_both_endpoints() {
        let mut frame = Frame::single_column("a", numbers(&[10.0, 15.0, 20.0]));
        rescale(&mut frame, &[]);
        assert_eq!(numeric_column(&frame, "a"), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn rescale_constant_column_shifts_to_zero_not_nan() {
        let mut frame = Frame::single_column("a", numbers(&[-42.0, -42.0, -42.0]));
        rescale(&mut frame, &[]);
        // shifted column is uniformly 0; only the affine map applies
        let values = numeric_column(&frame, "a");
        assert!(values.iter().all(|v| v.is_finite()));
        assert_eq!(values, vec![-1.0, -1.0, -1.0]);
    }

    #[test]
    fn rescale_leaves_excluded_columns_alone() {
        let mut frame = Frame::new();
        frame.push_column("a", numbers(&[0.0, 4.0]));
        frame.push_column("label", numbers(&[0.0, 1.0]));
        rescale(&mut frame, &["label"]);
        assert_eq!(numeric_column(&frame, "label"), vec![0.0, 1.0]);
    }
}

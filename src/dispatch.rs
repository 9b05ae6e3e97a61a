//! Per-request dispatch: one decoded request plus the connection's session
//! state in, one outcome out. All warehouse failures surface as `Err`, which
//! the connection loop downgrades to a dropped reply; nothing here may kill
//! the connection.

use tracing::debug;

use crate::frame::{Cell, Frame};
use crate::histogram;
use crate::session::SessionState;
use crate::traits::{quote_ident, quote_literal, Warehouse, WarehouseResult};
use crate::transform;
use crate::types::{
    FrameReply, Outcome, Reply, Request, ANOMALY_QUERY_TIMEOUT, ANOMALY_ROW_LIMIT, ANOMALY_TABLE,
    DEFAULT_HISTOGRAM_BINS, MAX_TIMESTAMP, MIN_TIMESTAMP, SEVERITY_COLUMN,
};

/// Route one request to its operation.
pub async fn dispatch(
    request: Request,
    session: &mut SessionState,
    warehouse: &dyn Warehouse,
) -> WarehouseResult<Outcome> {
    match request {
        Request::Connection => Ok(Outcome::Reply(Reply::Connected)),
        Request::Tables => tables(session, warehouse).await,
        Request::Columns { table } => columns(session, warehouse, &table).await,
        Request::Data {
            table,
            columns,
            start_timestamp,
            end_timestamp,
        } => {
            data(
                session,
                warehouse,
                &table,
                columns,
                start_timestamp.unwrap_or(MIN_TIMESTAMP),
                end_timestamp.unwrap_or(MAX_TIMESTAMP),
            )
            .await
        }
        Request::Anomalies => anomalies(session, warehouse).await,
        Request::Save {
            anomaly_id,
            verify_anomaly,
            anomaly_type,
        } => save(session, warehouse, anomaly_id, verify_anomaly, anomaly_type).await,
        Request::Unit { col_name } => unit(session, &col_name).await,
        Request::Histogram { bins } => {
            histogram_reply(session, warehouse, bins.unwrap_or(DEFAULT_HISTOGRAM_BINS)).await
        }
    }
}

/// `tables`: the dataset's table identifiers as a one-column frame.
async fn tables(session: &SessionState, warehouse: &dyn Warehouse) -> WarehouseResult<Outcome> {
    let names = warehouse.list_tables(session.dataset_id()).await?;
    let frame = Frame::single_column("table", names.into_iter().map(Cell::Text).collect());
    Ok(Outcome::Reply(Reply::Frame(FrameReply::new(
        "tables",
        frame.to_split(),
    ))))
}

/// `columns`: the table's column names minus the timestamp and label columns,
/// plus the configured default plot selection.
async fn columns(
    session: &SessionState,
    warehouse: &dyn Warehouse,
    table: &str,
) -> WarehouseResult<Outcome> {
    let cfg = session.config();
    let names = warehouse.list_columns(session.dataset_id(), table).await?;
    let kept: Vec<Cell> = names
        .into_iter()
        .filter(|name| {
            *name != cfg.frontend.timestamp_column_name && *name != cfg.frontend.label_column_name
        })
        .map(Cell::Text)
        .collect();

    let mut reply = FrameReply::new("columns", Frame::single_column("column", kept).to_split());
    reply.default = Some(cfg.frontend.init_cols_for_plot.clone());
    Ok(Outcome::Reply(Reply::Frame(reply)))
}

/// `data`: fetch the requested columns plus the timestamp column from the
/// bound table, mark the anomaly window, convert timestamps to epoch seconds,
/// and optionally rescale to [-1, 1] while recording the original min/max.
async fn data(
    session: &mut SessionState,
    warehouse: &dyn Warehouse,
    table: &str,
    columns: Vec<String>,
    window_start: f64,
    window_end: f64,
) -> WarehouseResult<Outcome> {
    let cfg = session.config_arc();
    let ts_col = cfg.frontend.timestamp_column_name.as_str();
    let label_col = cfg.frontend.label_column_name.as_str();

    // requested columns ∪ timestamp column, caller order preserved
    let mut fetch_cols: Vec<String> = Vec::with_capacity(columns.len() + 1);
    for col in columns {
        if !fetch_cols.contains(&col) {
            fetch_cols.push(col);
        }
    }
    if !fetch_cols.iter().any(|c| c == ts_col) {
        fetch_cols.push(ts_col.to_string());
    }

    let handle = session.bind(warehouse, table).await?;
    let mut frame = handle.fetch(&fetch_cols, 0).await?;

    transform::mark_window_label(&mut frame, ts_col, label_col, window_start, window_end);
    transform::timestamp_column_to_epoch(&mut frame, ts_col);

    let mut reply = FrameReply::new("data", Frame::new().to_split());
    if cfg.frontend.scale_data {
        let agg = transform::column_min_max(&frame, &[label_col]);
        transform::rescale(&mut frame, &[label_col]);
        reply.df_with_original_max_min = Some(agg.to_split());
    }
    reply.df = frame.to_split();
    Ok(Outcome::Reply(Reply::Frame(reply)))
}

/// `anomalies`: bulk fetch of the anomaly table, ordered by anomaly start,
/// with every timestamp-like column converted to epoch seconds.
async fn anomalies(session: &SessionState, warehouse: &dyn Warehouse) -> WarehouseResult<Outcome> {
    let cfg = session.config();
    let select = match &cfg.frontend.cols_from_anomaly_tab {
        Some(cols) => cols
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        None => "*".to_string(),
    };
    let sql = format!(
        "SELECT {select} FROM {}.{} ORDER BY start_ts LIMIT {ANOMALY_ROW_LIMIT}",
        quote_ident(session.dataset_id()),
        quote_ident(ANOMALY_TABLE),
    );

    let mut frame = warehouse.query(&sql, ANOMALY_QUERY_TIMEOUT).await?;
    transform::epoch_convert_timestamp_columns(&mut frame);
    Ok(Outcome::Reply(Reply::Frame(FrameReply::new(
        "anomalies",
        frame.to_split(),
    ))))
}

/// `save`: persistence only, never answered. Each present field updates its
/// configured feedback column independently; re-running with the same value
/// is a no-op on the persisted state.
async fn save(
    session: &SessionState,
    warehouse: &dyn Warehouse,
    anomaly_id: Option<String>,
    verify_anomaly: Option<bool>,
    anomaly_type: Option<String>,
) -> WarehouseResult<Outcome> {
    if verify_anomaly.is_none() && anomaly_type.is_none() {
        return Ok(Outcome::SideEffectOnly);
    }
    let Some(id) = anomaly_id else {
        debug!("save request carries an update but no anomaly_id, dropping");
        return Ok(Outcome::Drop);
    };

    let cfg = session.config();
    let table = format!(
        "{}.{}",
        quote_ident(&cfg.dataset_id),
        quote_ident(&cfg.frontend.feedback_table_name)
    );
    if let Some(verified) = verify_anomaly {
        let stmt = format!(
            "UPDATE {table} SET {} = {verified} WHERE anomaly_id = {}",
            quote_ident(&cfg.frontend.anomaly_feedback_col),
            quote_literal(&id),
        );
        warehouse.execute_update(&stmt).await?;
    }
    if let Some(kind) = anomaly_type {
        let stmt = format!(
            "UPDATE {table} SET {} = {} WHERE anomaly_id = {}",
            quote_ident(&cfg.frontend.anomaly_type_col),
            quote_literal(&kind),
            quote_literal(&id),
        );
        warehouse.execute_update(&stmt).await?;
    }
    Ok(Outcome::SideEffectOnly)
}

/// `unit`: raw values of one column from the current binding. Requires an
/// existing binding; never creates one.
async fn unit(session: &SessionState, col_name: &str) -> WarehouseResult<Outcome> {
    let Some(handle) = session.current_handle() else {
        debug!("unit request before any source binding exists, dropping");
        return Ok(Outcome::Drop);
    };
    let frame = handle.fetch(&[col_name.to_string()], 0).await?;
    Ok(Outcome::Reply(Reply::Frame(FrameReply::new(
        "unit",
        frame.to_split(),
    ))))
}

/// `histogram`: log-compressed severity histogram over the anomaly table.
async fn histogram_reply(
    session: &mut SessionState,
    warehouse: &dyn Warehouse,
    bins: usize,
) -> WarehouseResult<Outcome> {
    let handle = session.bind(warehouse, ANOMALY_TABLE).await?;
    let frame = handle.fetch(&[SEVERITY_COLUMN.to_string()], 0).await?;
    let severities = frame.numeric_values(SEVERITY_COLUMN);

    let hist = histogram::build(&severities, bins);
    let compressed = histogram::log_compress(&hist.counts);

    let mut out = Frame::new();
    out.push_column("hist", compressed.into_iter().map(Cell::Number).collect());
    out.push_column(
        "bins",
        hist.left_edges.into_iter().map(Cell::Number).collect(),
    );
    Ok(Outcome::Reply(Reply::Frame(FrameReply::new(
        "histogram",
        out.to_split(),
    ))))
}

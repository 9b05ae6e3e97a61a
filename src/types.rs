use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::frame::SplitFrame;

/// Default lower edge of the data time window.
pub const MIN_TIMESTAMP: f64 = 0.0;
/// Far-future sentinel used when no upper edge is given.
pub const MAX_TIMESTAMP: f64 = 9_223_279_200.0;
/// Default histogram bin count.
pub const DEFAULT_HISTOGRAM_BINS: usize = 300;
/// Fixed table holding detected anomalies, per dataset.
pub const ANOMALY_TABLE: &str = "anomaly";
/// Numeric severity column of the anomaly table, the histogram input.
pub const SEVERITY_COLUMN: &str = "severity";
/// Row limit for bulk anomaly fetches.
pub const ANOMALY_ROW_LIMIT: u64 = 1_000_000;
/// Ceiling on the bulk anomaly query.
pub const ANOMALY_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// One decoded client request. Unknown `request` values, malformed JSON, and
/// ill-typed fields are all decode failures; the connection loop drops them.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum Request {
    /// Connectivity probe; answered with a bare acknowledgement.
    Connection,
    /// List the tables of the session dataset.
    Tables,
    /// List the plottable columns of one table.
    Columns { table: String },
    /// Fetch column data with window labelling and optional rescaling.
    Data {
        table: String,
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default, deserialize_with = "scalar_f64_opt")]
        start_timestamp: Option<f64>,
        #[serde(default, deserialize_with = "scalar_f64_opt")]
        end_timestamp: Option<f64>,
    },
    /// Bulk fetch of the anomaly table.
    Anomalies,
    /// Persist anomaly feedback; never answered.
    Save {
        #[serde(default)]
        anomaly_id: Option<String>,
        #[serde(default)]
        verify_anomaly: Option<bool>,
        #[serde(default)]
        anomaly_type: Option<String>,
    },
    /// Raw values of a single column from the currently bound table.
    Unit { col_name: String },
    /// Severity histogram over the anomaly table.
    Histogram {
        #[serde(default, deserialize_with = "scalar_usize_opt")]
        bins: Option<usize>,
    },
}

impl Request {
    /// Wire name of the request kind, echoed back as `response_to`.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Connection => "connection",
            Request::Tables => "tables",
            Request::Columns { .. } => "columns",
            Request::Data { .. } => "data",
            Request::Anomalies => "anomalies",
            Request::Save { .. } => "save",
            Request::Unit { .. } => "unit",
            Request::Histogram { .. } => "histogram",
        }
    }
}

/// The frontend sends numeric fields both as JSON numbers and as numeric
/// strings; accept either form.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumericScalar {
    Number(f64),
    Text(String),
}

impl NumericScalar {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            NumericScalar::Number(v) => Ok(v),
            NumericScalar::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("not a numeric value: {s:?}"))),
        }
    }
}

fn scalar_f64_opt<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    Option::<NumericScalar>::deserialize(de)?
        .map(NumericScalar::into_f64)
        .transpose()
}

fn scalar_usize_opt<'de, D: Deserializer<'de>>(de: D) -> Result<Option<usize>, D::Error> {
    Ok(scalar_f64_opt(de)?.map(|v| v.max(0.0) as usize))
}

/// Table-shaped reply envelope.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReply {
    /// Echo of the request kind.
    pub response_to: &'static str,
    /// The shaped table, split orientation.
    pub df: SplitFrame,
    /// Default plotted columns; present only for `columns` replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Vec<String>>,
    /// Pre-rescale per-column min/max; present only for scaled `data` replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub df_with_original_max_min: Option<SplitFrame>,
}

impl FrameReply {
    pub fn new(response_to: &'static str, df: SplitFrame) -> Self {
        Self {
            response_to,
            df,
            default: None,
            df_with_original_max_min: None,
        }
    }
}

/// A reply ready for the transport.
#[derive(Debug, Clone, Serialize)]
pub enum Reply {
    /// Fixed acknowledgement for `connection` probes, sent as bare text.
    Connected,
    /// JSON-encoded table envelope.
    Frame(FrameReply),
}

impl Reply {
    /// Encode for the wire.
    pub fn into_text(self) -> Result<String, serde_json::Error> {
        match self {
            Reply::Connected => Ok("Connected".to_string()),
            Reply::Frame(frame) => serde_json::to_string(&frame),
        }
    }
}

/// What the dispatcher decided to do with one request.
#[derive(Debug)]
pub enum Outcome {
    /// Send this reply.
    Reply(Reply),
    /// The request was persistence-only; acknowledged by silence.
    SideEffectOnly,
    /// Silently ignore: malformed input or unmet precondition.
    Drop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_requests() {
        let req: Request = serde_json::from_str(r#"{"request":"tables"}"#).unwrap();
        assert_eq!(req.kind(), "tables");

        let req: Request =
            serde_json::from_str(r#"{"request":"columns","table":"c4-31110"}"#).unwrap();
        assert!(matches!(req, Request::Columns { table } if table == "c4-31110"));
    }

    #[test]
    fn numeric_fields_accept_strings_and_numbers() {
        let req: Request = serde_json::from_str(
            r#"{"request":"data","table":"t","columns":["current"],
                "start_timestamp":"1568418338","end_timestamp":1568457104}"#,
        )
        .unwrap();
        match req {
            Request::Data {
                start_timestamp,
                end_timestamp,
                ..
            } => {
                assert_eq!(start_timestamp, Some(1_568_418_338.0));
                assert_eq!(end_timestamp, Some(1_568_457_104.0));
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let req: Request =
            serde_json::from_str(r#"{"request":"histogram","bins":"40"}"#).unwrap();
        assert!(matches!(req, Request::Histogram { bins: Some(40) }));
    }

    #[test]
    fn unknown_kind_and_missing_tag_fail_to_decode() {
        assert!(serde_json::from_str::<Request>(r#"{"request":"nope"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"table":"t"}"#).is_err());
        assert!(serde_json::from_str::<Request>("not json").is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let req: Request =
            serde_json::from_str(r#"{"request":"tables","extra":123}"#).unwrap();
        assert_eq!(req.kind(), "tables");
    }

    #[test]
    fn connected_reply_is_bare_text() {
        assert_eq!(Reply::Connected.into_text().unwrap(), "Connected");
    }

    #[test]
    fn frame_reply_omits_absent_extras() {
        let reply = FrameReply::new(
            "tables",
            SplitFrame {
                columns: vec!["table".into()],
                data: vec![],
            },
        );
        let json = serde_json::to_string(&Reply::Frame(reply)).unwrap();
        assert!(json.contains("\"response_to\":\"tables\""));
        assert!(!json.contains("default"));
        assert!(!json.contains("df_with_original_max_min"));
    }
}

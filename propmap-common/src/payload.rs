//! Uploaded log payloads
//!
//! A payload arrives as raw JSON bytes, either POSTed directly or submitted
//! by the uploader from a watched directory. Parsing splits problems into two
//! classes:
//! - structural problems (not JSON, no usable source callsign, `contacts`
//!   not an array, ...) reject the whole upload with `Error::MalformedPayload`
//! - a bad individual contact record is skipped and reported in `skipped`
//!
//! Every parsed payload carries a fingerprint derived only from its content,
//! so re-uploading the same file (under any name) always yields the same value.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::callsign::{Callsign, Grid};
use crate::time::timestamp_from_json;
use crate::{Error, Result};

/// Signal-quality metadata attached to a contact
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalReport {
    /// Reported signal-to-noise ratio in dB
    pub snr_db: Option<f64>,
    /// Dial plus audio offset frequency in Hz
    pub frequency_hz: Option<i64>,
    /// Mode name, upper-cased ("FT8", "WSPR", ...)
    pub mode: Option<String>,
}

/// A single directional TX→RX observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactEvent {
    pub tx: Callsign,
    pub rx: Callsign,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub signal: SignalReport,
}

/// A contact plus any grids the record reported for its endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct ContactRecord {
    pub event: ContactEvent,
    pub tx_grid: Option<Grid>,
    pub rx_grid: Option<Grid>,
}

/// A contact record that was dropped during parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    /// Position in the payload's `contacts` array
    pub index: usize,
    pub reason: String,
}

/// A structurally valid log payload
#[derive(Debug, Clone)]
pub struct LogPayload {
    /// Station that produced the log
    pub source: Callsign,
    /// Source station grid, if the log reported one
    pub grid: Option<Grid>,
    /// Explicit observation time of the log
    pub observed_at: Option<DateTime<Utc>>,
    /// Informational file name; not part of the fingerprint
    pub source_file: Option<String>,
    /// Well-formed contact records
    pub contacts: Vec<ContactRecord>,
    /// Malformed contact records that were skipped
    pub skipped: Vec<SkippedRecord>,
    /// Stable content fingerprint (hex SHA-256)
    pub fingerprint: String,
}

impl LogPayload {
    /// Parse a payload from raw request/file bytes
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| Error::MalformedPayload(format!("body is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Parse a payload from an already-decoded JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::MalformedPayload("payload must be a JSON object".to_string()))?;

        let source_value = non_null(obj, "station_callsign")
            .or_else(|| non_null(obj, "listener_callsign"))
            .ok_or_else(|| Error::MalformedPayload("missing station_callsign".to_string()))?;
        let source = source_value
            .as_str()
            .ok_or_else(|| Error::MalformedPayload("station_callsign must be a string".to_string()))
            .and_then(|s| Callsign::parse(s).map_err(|e| Error::MalformedPayload(e.to_string())))?;

        let grid = match non_null(obj, "grid") {
            None => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => {
                Some(Grid::parse(s).map_err(|e| Error::MalformedPayload(e.to_string()))?)
            }
            Some(_) => return Err(Error::MalformedPayload("grid must be a string".to_string())),
        };

        let observed_at = match non_null(obj, "observed_at") {
            None => None,
            Some(v) => Some(
                timestamp_from_json(v)
                    .map_err(|e| Error::MalformedPayload(format!("observed_at: {}", e)))?,
            ),
        };

        let source_file = obj
            .get("source_file")
            .and_then(Value::as_str)
            .map(str::to_string);

        let raw_contacts: &[Value] = match non_null(obj, "contacts") {
            None => &[],
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(Error::MalformedPayload("contacts must be an array".to_string()))
            }
        };

        let mut contacts = Vec::with_capacity(raw_contacts.len());
        let mut skipped = Vec::new();
        for (index, raw) in raw_contacts.iter().enumerate() {
            match parse_contact(raw) {
                Ok(record) => contacts.push(record),
                Err(reason) => skipped.push(SkippedRecord { index, reason }),
            }
        }

        let fingerprint = fingerprint(&source, obj, &contacts, observed_at);

        Ok(Self {
            source,
            grid,
            observed_at,
            source_file,
            contacts,
            skipped,
            fingerprint,
        })
    }

    /// Earliest and latest contact timestamps
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.contacts.iter().map(|c| c.event.timestamp).min()?;
        let last = self.contacts.iter().map(|c| c.event.timestamp).max()?;
        Some((first, last))
    }

    /// When the source station was last known to be active according to this log
    ///
    /// Explicit `observed_at` wins; otherwise the latest contact timestamp.
    pub fn presence_time(&self) -> Option<DateTime<Utc>> {
        self.observed_at
            .or_else(|| self.time_range().map(|(_, last)| last))
    }
}

fn non_null<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn parse_contact(raw: &Value) -> std::result::Result<ContactRecord, String> {
    let obj = raw.as_object().ok_or("contact record is not an object")?;

    let tx = required_callsign(obj, "tx_callsign")?;
    let rx = required_callsign(obj, "rx_callsign")?;
    if tx == rx {
        return Err(format!("tx and rx are both {}", tx));
    }

    let timestamp = non_null(obj, "timestamp")
        .ok_or("missing timestamp")
        .map_err(str::to_string)
        .and_then(|v| timestamp_from_json(v).map_err(|e| e.to_string()))?;

    let snr_db = match non_null(obj, "snr_db") {
        None => None,
        Some(v) => Some(v.as_f64().ok_or("snr_db must be a number")?),
    };

    let frequency_hz = match non_null(obj, "frequency_hz") {
        None => None,
        Some(v) => Some(
            v.as_i64()
                .or_else(|| v.as_f64().map(|f| f.round() as i64))
                .filter(|hz| *hz > 0)
                .ok_or("frequency_hz must be a positive number")?,
        ),
    };

    let mode = match non_null(obj, "mode") {
        None => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.trim().to_ascii_uppercase()),
        Some(_) => return Err("mode must be a string".to_string()),
    };

    let tx_grid = optional_grid(obj, "tx_grid")?;
    let rx_grid = optional_grid(obj, "rx_grid")?;

    Ok(ContactRecord {
        event: ContactEvent {
            tx,
            rx,
            timestamp,
            signal: SignalReport {
                snr_db,
                frequency_hz,
                mode,
            },
        },
        tx_grid,
        rx_grid,
    })
}

fn required_callsign(obj: &Map<String, Value>, key: &str) -> std::result::Result<Callsign, String> {
    let raw = non_null(obj, key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing {}", key))?;
    Callsign::parse(raw).map_err(|e| format!("{}: {}", key, e))
}

fn optional_grid(obj: &Map<String, Value>, key: &str) -> std::result::Result<Option<Grid>, String> {
    match non_null(obj, key) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Grid::parse(s).map(Some).map_err(|e| format!("{}: {}", key, e)),
        Some(_) => Err(format!("{} must be a string", key)),
    }
}

/// Compute the dedup fingerprint of a payload
///
/// SHA-256 over the normalized source callsign, the contact time range and a
/// digest of the canonical JSON of the identity-relevant fields
/// (`station_callsign`, `grid`, `observed_at`, `contacts`). `source_file` is
/// left out so the same log uploaded from a renamed file still collides.
/// A heartbeat with no contacts and no `observed_at` therefore fingerprints
/// the same every time; repeated heartbeats must carry `observed_at`.
fn fingerprint(
    source: &Callsign,
    obj: &Map<String, Value>,
    contacts: &[ContactRecord],
    observed_at: Option<DateTime<Utc>>,
) -> String {
    let mut identity = Map::new();
    identity.insert("station_callsign".to_string(), Value::String(source.to_string()));
    for key in ["grid", "observed_at", "contacts"] {
        identity.insert(key.to_string(), obj.get(key).cloned().unwrap_or(Value::Null));
    }

    let mut canonical = Vec::new();
    write_canonical(&Value::Object(identity), &mut canonical);
    let content_digest = format!("{:x}", Sha256::digest(&canonical));

    let first = contacts.iter().map(|c| c.event.timestamp).min().or(observed_at);
    let last = contacts.iter().map(|c| c.event.timestamp).max().or(observed_at);
    let bound = |ts: Option<DateTime<Utc>>| {
        ts.map(|t| t.timestamp_millis().to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(bound(first).as_bytes());
    hasher.update(b"|");
    hasher.update(bound(last).as_bytes());
    hasher.update(b"|");
    hasher.update(content_digest.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Serialize JSON with object keys sorted, independent of serde_json's map ordering
fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(&Value::String(key.clone()), out);
                out.push(b':');
                write_canonical(&map[key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}

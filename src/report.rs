//! Report model and wire codec.
//!
//! A client submits one JSON envelope per request:
//!
//! ```json
//! { "type": "adData", "guid": "g1",
//!   "adData": { "adRequestStart": 100.0, "adRequestEnd": 142.5, "hasPreroll": true } }
//! ```
//!
//! The `type` tag selects which payload key is read. On the Rust side that
//! becomes [`ReportBody`], so a report carries exactly one payload and the
//! other three variants cannot be half-populated.
//!
//! Decoding is lenient about shape: absent or `null` fields take their zero
//! value and unknown keys are ignored. It is strict about syntax and JSON
//! types, which is the only way a report can fail with
//! [`ReportError::MalformedPayload`].

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Type tag for player environment reports.
pub const ENV_DATA: &str = "envData";
/// Type tag for ad request timing reports.
pub const AD_DATA: &str = "adData";
/// Type tag for asset description reports.
pub const ASSET_DATA: &str = "assetData";
/// Type tag for player event logs.
pub const EVENT_LOG: &str = "eventLog";

/// Metric/log label used for any tag outside the four known ones.
pub const UNRECOGNIZED: &str = "unrecognized";

/// Errors raised while moving a report between bytes and the typed model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("failed to encode report: {0}")]
    Encode(String),
}

/// One client-submitted telemetry envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Opaque client identifier, never validated.
    pub guid: String,
    pub body: ReportBody,
}

/// The active payload of a [`Report`], selected by its `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportBody {
    Env(EnvData),
    Ad(AdData),
    Asset(AssetData),
    EventLog(Vec<EventLogItem>),
    /// Any tag we do not know. Kept verbatim so it can be indexed as sent.
    Unrecognized(String),
}

/// Player environment snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvData {
    #[serde(deserialize_with = "null_as_default")]
    pub user_agent: String,
    #[serde(deserialize_with = "null_as_default")]
    pub page_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub player_adapter: String,
    #[serde(deserialize_with = "null_as_default")]
    pub player_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ad_blocker_present: bool,
}

/// Ad request timings for a single playback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdData {
    #[serde(deserialize_with = "null_as_default")]
    pub ad_request_start: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub ad_request_end: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub ad_request_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub has_preroll: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub preroll: Preroll,
    /// Server-derived; whatever the client sent under this key is dropped.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub ad_request_delta: Option<f64>,
}

/// Identifiers of the preroll that was served.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preroll {
    #[serde(deserialize_with = "null_as_default")]
    pub ad_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub creative_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub creative_rendition_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub slot_custom_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetData {
    #[serde(deserialize_with = "null_as_default")]
    pub asset_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub asset_mpx_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub asset_guid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cc_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogItem {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: f64,
}

impl Report {
    pub fn new(guid: impl Into<String>, body: ReportBody) -> Self {
        Self {
            guid: guid.into(),
            body,
        }
    }

    /// Decode a report from the request body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ReportError> {
        // serde would happily build a struct out of a JSON array; reports are
        // objects only.
        match bytes.iter().copied().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => {}
            Some(_) => {
                return Err(ReportError::MalformedPayload(
                    "expected a JSON object".to_string(),
                ));
            }
            None => return Err(ReportError::MalformedPayload("empty body".to_string())),
        }

        serde_json::from_slice(bytes).map_err(|err| ReportError::MalformedPayload(err.to_string()))
    }

    /// Encode the report in its wire shape.
    pub fn to_vec(&self) -> Result<Vec<u8>, ReportError> {
        serde_json::to_vec(self).map_err(|err| ReportError::Encode(err.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Bytes, ReportError> {
        self.to_vec().map(Bytes::from)
    }

    /// The declared type tag, exactly as the client sent it.
    pub fn kind(&self) -> &str {
        match &self.body {
            ReportBody::Env(_) => ENV_DATA,
            ReportBody::Ad(_) => AD_DATA,
            ReportBody::Asset(_) => ASSET_DATA,
            ReportBody::EventLog(_) => EVENT_LOG,
            ReportBody::Unrecognized(tag) => tag,
        }
    }

    /// Bounded label for metrics: the known tags, or `unrecognized`.
    pub fn label(&self) -> &'static str {
        match &self.body {
            ReportBody::Env(_) => ENV_DATA,
            ReportBody::Ad(_) => AD_DATA,
            ReportBody::Asset(_) => ASSET_DATA,
            ReportBody::EventLog(_) => EVENT_LOG,
            ReportBody::Unrecognized(_) => UNRECOGNIZED,
        }
    }
}

impl AdData {
    pub fn request_span(&self) -> f64 {
        self.ad_request_end - self.ad_request_start
    }
}

/// Decoding view of the envelope. Every payload key is optional; the tag
/// decides which one survives.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReport {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    guid: String,
    #[serde(default)]
    env_data: Option<EnvData>,
    #[serde(default)]
    ad_data: Option<AdData>,
    #[serde(default)]
    asset_data: Option<AssetData>,
    #[serde(default)]
    event_log: Option<Vec<EventLogItem>>,
}

/// Encoding view of the envelope, borrowing from a [`Report`].
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireReportRef<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    guid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    env_data: Option<&'a EnvData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ad_data: Option<&'a AdData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    asset_data: Option<&'a AssetData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_log: Option<&'a [EventLogItem]>,
}

impl From<WireReport> for Report {
    fn from(wire: WireReport) -> Self {
        let WireReport {
            kind,
            guid,
            env_data,
            ad_data,
            asset_data,
            event_log,
        } = wire;

        let body = match kind.as_str() {
            ENV_DATA => ReportBody::Env(env_data.unwrap_or_default()),
            AD_DATA => ReportBody::Ad(ad_data.unwrap_or_default()),
            ASSET_DATA => ReportBody::Asset(asset_data.unwrap_or_default()),
            EVENT_LOG => ReportBody::EventLog(event_log.unwrap_or_default()),
            _ => ReportBody::Unrecognized(kind.clone()),
        };

        Report { guid, body }
    }
}

impl<'de> Deserialize<'de> for Report {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        WireReport::deserialize(deserializer).map(Report::from)
    }
}

impl Serialize for Report {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut wire = WireReportRef {
            kind: self.kind(),
            guid: &self.guid,
            env_data: None,
            ad_data: None,
            asset_data: None,
            event_log: None,
        };
        match &self.body {
            ReportBody::Env(data) => wire.env_data = Some(data),
            ReportBody::Ad(data) => wire.ad_data = Some(data),
            ReportBody::Asset(data) => wire.asset_data = Some(data),
            ReportBody::EventLog(items) => wire.event_log = Some(items),
            ReportBody::Unrecognized(_) => {}
        }
        wire.serialize(serializer)
    }
}

/// `null` decodes like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

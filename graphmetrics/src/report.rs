//! The schema-usage report data model and the wire form of the ingest RPC.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// The GraphQL operation kind a report was recorded for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Lowercase form used in persisted rows.
    pub fn as_lowercase(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationInfo {
    /// Opaque hash identifying the normalized operation document.
    pub hash: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    /// The raw GraphQL document. One document per hash is assumed.
    pub document: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaInfo {
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestInfo {
    pub status_code: i32,
    /// Empty when the request succeeded.
    pub error: String,
}

/// Per-field usage. `path` identifies the field, `type_names` the possible
/// enclosing types, `subgraph_ids` the services that resolved it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldUsage {
    pub path: Vec<String>,
    pub type_names: Vec<String>,
    pub named_type: String,
    #[serde(rename = "subgraphIDs")]
    pub subgraph_ids: Vec<String>,
    pub count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArgumentUsage {
    pub path: Vec<String>,
    pub type_name: String,
    pub named_type: String,
    pub count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputUsage {
    pub path: Vec<String>,
    pub type_name: String,
    pub named_type: String,
    pub count: u64,
}

/// One request's schema usage as reported by a router.
///
/// Metric sequences are ordered and that order is preserved through
/// aggregation, because downstream joins are positional.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageReport {
    pub operation: OperationInfo,
    pub schema: SchemaInfo,
    pub client: ClientInfo,
    pub request: RequestInfo,
    pub attributes: HashMap<String, String>,
    pub type_field_metrics: Vec<FieldUsage>,
    pub argument_metrics: Vec<ArgumentUsage>,
    pub input_metrics: Vec<InputUsage>,
}

/// Body of the publish-metrics RPC.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishMetricsRequest {
    pub schema_usage: Vec<UsageReport>,
}

/// Empty on success; the RPC carries no partial-success protocol.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PublishMetricsResponse {}

use serde::{Deserialize, Serialize};

/// One aggregate bucket, keyed by the display label of the grouped value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBucket {
    pub key: String,
    pub count: i64,
}

/// Crew-facing aggregate counts over all requests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub total: i64,
    pub by_status: Vec<CountBucket>,
    pub by_category: Vec<CountBucket>,
    pub by_priority: Vec<CountBucket>,
}

use serde::Deserialize;
use serde_json::Value;

/// A plant as retrieved from the backend. Only `user_id`, `type_`, and
/// `name` are consumed by the alert pipeline; everything else is opaque
/// metadata carried through unread.
#[derive(Debug, Clone, Deserialize)]
pub struct Plant {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(flatten)]
    pub metadata: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub phone_number: Option<String>,
}

//! Demo entities stored in the review containers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Document;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub loyalty_tier: String,
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub member_since: String,
    #[serde(default)]
    pub member_since_year: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductReview {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub verified_purchase: bool,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub review: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_date: String,
}

/// A review padded with extra properties, used to make indexing cost visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductReviewDetailed {
    pub id: String,
    pub partition_key: String,
    pub username: String,
    pub verified_purchase: bool,
    pub product: String,
    pub review: String,
    pub rating: f64,
    pub review_date: DateTime<Utc>,
    pub document_type: String,
    pub prop1: String,
    pub prop2: String,
    pub prop3: String,
    pub prop4: String,
    pub prop5: String,
    pub prop6: String,
    pub prop7: String,
    pub prop8: String,
    pub prop9: String,
    pub prop10: String,
    pub prop11: String,
    pub prop12: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTaskItem {
    pub id: String,
    #[serde(rename = "_partitionKey", skip_serializing_if = "Option::is_none", default)]
    pub partition_key: Option<String>,
    pub status: String,
}

/// Record kinds sharing the review containers, told apart by `documentType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "documentType")]
pub enum DemoRecord {
    #[serde(rename = "user")]
    User(User),
    #[serde(rename = "review")]
    Review(ProductReview),
}

impl DemoRecord {
    pub fn id(&self) -> &str {
        match self {
            DemoRecord::User(u) => &u.id,
            DemoRecord::Review(r) => &r.id,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            DemoRecord::User(u) => &u.username,
            DemoRecord::Review(r) => &r.username,
        }
    }
}

/// Serializes any record into a loosely-typed document.
pub fn to_document<T: Serialize>(record: &T) -> Result<Document, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn demo_records_round_trip_through_document_type() {
        let raw = json!({
            "id": "Curt28",
            "username": "Curt28",
            "firstName": "Curt",
            "documentType": "user",
            "memberSince": "2018-01-02T00:00:00"
        });
        let rec: DemoRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(rec.id(), "Curt28");
        let doc = to_document(&rec).unwrap();
        assert_eq!(doc["documentType"], "user");
        assert_eq!(doc["firstName"], "Curt");
    }

    #[test]
    fn unknown_document_types_are_rejected() {
        let raw = json!({"id": "x", "username": "y", "documentType": "order"});
        assert!(serde_json::from_value::<DemoRecord>(raw).is_err());
    }

    #[test]
    fn task_item_omits_missing_partition_key() {
        let bob = UserTaskItem {
            id: "bob".into(),
            partition_key: None,
            status: "Learning".into(),
        };
        let doc = to_document(&bob).unwrap();
        assert!(!doc.contains_key("_partitionKey"));
        let alice = UserTaskItem {
            partition_key: Some("alice".into()),
            ..bob
        };
        assert_eq!(to_document(&alice).unwrap()["_partitionKey"], "alice");
    }
}

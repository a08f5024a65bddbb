//! Concurrent import of demo records into several containers at once.

use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::Value;

use crate::records::{DemoRecord, to_document};
use crate::store::{CollectionRef, DocumentStore, PartitionKey, StoreError, WriteMode};

/// A container to load into, with the property its partition key is read from.
#[derive(Clone, Debug)]
pub struct BulkTarget {
    pub collection: CollectionRef,
    pub partition_key_path: String,
}

impl BulkTarget {
    pub fn new(collection: CollectionRef, partition_key_path: impl Into<String>) -> Self {
        Self {
            collection,
            partition_key_path: partition_key_path.into(),
        }
    }

    fn key_for(&self, doc: &serde_json::Map<String, Value>) -> PartitionKey {
        let prop = self.partition_key_path.trim_start_matches('/');
        match doc.get(prop) {
            Some(Value::String(s)) => PartitionKey::Value(s.clone()),
            Some(Value::Null) | None => PartitionKey::None,
            Some(other) => PartitionKey::Value(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub records: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl BulkReport {
    /// Records counted once even though they land in every target.
    pub fn imported(&self, targets: usize) -> usize {
        self.succeeded / targets.max(1)
    }
}

async fn load_one(store: &dyn DocumentStore, record: &DemoRecord, targets: &[BulkTarget]) -> usize {
    let doc = match to_document(record) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(id = record.id(), error = %e, "cannot serialize record");
            return 0;
        }
    };
    let writes = targets.iter().map(|t| {
        let pk = t.key_for(&doc);
        let doc = &doc;
        async move {
            let res: Result<_, StoreError> =
                store.write(&t.collection, doc, &pk, WriteMode::Upsert).await;
            if let Err(e) = &res {
                tracing::warn!(
                    id = record.id(),
                    collection = %t.collection,
                    status = ?e.status,
                    error = %e,
                    "bulk upsert failed"
                );
            }
            res.is_ok()
        }
    });
    join_all(writes).await.into_iter().filter(|ok| *ok).count()
}

/// Upserts every record into every target. Failures are counted and logged;
/// sibling writes always run to completion.
pub async fn bulk_load(
    store: &dyn DocumentStore,
    records: &[DemoRecord],
    targets: &[BulkTarget],
) -> BulkReport {
    let start = Instant::now();
    let per_record = records.iter().map(|r| load_one(store, r, targets));
    let succeeded: usize = join_all(per_record).await.into_iter().sum();
    let attempted = records.len() * targets.len();
    let report = BulkReport {
        records: records.len(),
        attempted,
        succeeded,
        failed: attempted - succeeded,
        elapsed: start.elapsed(),
    };
    tracing::info!(
        records = report.records,
        succeeded = report.succeeded,
        failed = report.failed,
        "bulk load finished"
    );
    report
}

//! Benchmarked execution of a single operation descriptor.

use std::time::{Duration, Instant};

use crate::descriptor::{OperationDescriptor, OperationKind, WritePayload};
use crate::store::{CollectionRef, Document, DocumentStore, PageRequest, StoreError};

/// Characters of a streamed page shown in the report.
pub const EXCERPT_CHARS: usize = 750;

#[derive(thiserror::Error, Debug, Clone)]
pub enum RunError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("{target} is not provisioned ({cause}); run scenario 0 first")]
    Unresolved { target: CollectionRef, cause: StoreError },
    #[error("cannot build write payload: {0}")]
    Payload(String),
}

impl RunError {
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            RunError::Store(e) => Some(e),
            RunError::Unresolved { cause, .. } => Some(cause),
            RunError::Payload(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchmarkResult {
    pub operation: &'static str,
    pub result_count: usize,
    pub elapsed: Duration,
    pub cost_units: f64,
    pub pages: usize,
    pub page_item_counts: Vec<usize>,
    /// Continuation left behind by a page-limited query.
    pub continuation: Option<String>,
    pub body_excerpt: Option<String>,
    /// Item echoed by a point read or write.
    pub item: Option<Document>,
}

impl BenchmarkResult {
    fn empty(operation: &'static str) -> Self {
        Self {
            operation,
            result_count: 0,
            elapsed: Duration::ZERO,
            cost_units: 0.0,
            pages: 0,
            page_item_counts: Vec::new(),
            continuation: None,
            body_excerpt: None,
            item: None,
        }
    }
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Runs one descriptor and measures it. Never retries; two runs share nothing.
pub async fn run_operation(
    store: &dyn DocumentStore,
    descriptor: &OperationDescriptor,
) -> Result<BenchmarkResult, RunError> {
    let target = descriptor.target();
    store
        .resolve(target)
        .await
        .map_err(|cause| match cause.is_not_found() {
            true => RunError::Unresolved {
                target: target.clone(),
                cause,
            },
            false => RunError::Store(cause),
        })?;
    let options = descriptor.options();
    let mut result = BenchmarkResult::empty(descriptor.label());

    match descriptor.kind() {
        OperationKind::Query { text } if options.streaming => {
            let start = Instant::now();
            let page = store.query_page_raw(target, text, None).await?;
            result.elapsed = start.elapsed();
            result.pages = 1;
            result.result_count = page.item_count;
            result.page_item_counts.push(page.item_count);
            result.cost_units = page.cost_units;
            result.body_excerpt = Some(excerpt(&page.body));
            if let Some(tok) = &page.continuation {
                tracing::info!(continuation = %tok, "streamed page left a continuation");
            }
            result.continuation = page.continuation;
        }
        OperationKind::Query { text } => {
            let request = PageRequest {
                page_size: options.page_size,
                concurrency: options.concurrency,
            };
            let limit = options.page_limit.map(|n| n.max(1) as usize);
            let mut continuation: Option<String> = None;
            let start = Instant::now();
            loop {
                let page = store
                    .query_page(target, text, &request, continuation.as_deref())
                    .await?;
                result.pages += 1;
                result.cost_units += page.cost_units;
                result.result_count += page.items.len();
                result.page_item_counts.push(page.items.len());
                continuation = page.continuation;
                tracing::trace!(page = result.pages, items = page.items.len(), "query page");
                if continuation.is_none() || limit.is_some_and(|l| result.pages >= l) {
                    break;
                }
            }
            result.elapsed = start.elapsed();
            result.continuation = continuation;
        }
        OperationKind::PointRead { id, partition_key } => {
            let start = Instant::now();
            let response = store.point_read(target, id, partition_key).await?;
            result.elapsed = start.elapsed();
            result.pages = 1;
            result.result_count = 1;
            result.page_item_counts.push(1);
            result.cost_units = response.cost_units;
            result.item = response.item;
        }
        OperationKind::Write { payload, mode } => {
            let (document, partition_key) = match payload {
                WritePayload::Fixed {
                    document,
                    partition_key,
                } => (document.clone(), partition_key.clone()),
                WritePayload::Generated(generate) => {
                    generate().map_err(|e| RunError::Payload(e.to_string()))?
                }
                WritePayload::Shared => {
                    return Err(RunError::Payload("shared payload was never bound".to_string()));
                }
            };
            let start = Instant::now();
            let response = store.write(target, &document, &partition_key, *mode).await?;
            result.elapsed = start.elapsed();
            result.pages = 1;
            result.result_count = 1;
            result.page_item_counts.push(1);
            result.cost_units = response.cost_units;
            result.item = response.item.or(Some(document));
        }
        OperationKind::Delete { id, partition_key } => {
            let start = Instant::now();
            let response = store.delete(target, id, partition_key).await?;
            result.elapsed = start.elapsed();
            result.pages = 1;
            result.result_count = 1;
            result.page_item_counts.push(1);
            result.cost_units = response.cost_units;
            result.item = response.item;
        }
    }
    tracing::debug!(
        operation = result.operation,
        collection = %target,
        results = result.result_count,
        pages = result.pages,
        cost = result.cost_units,
        elapsed_ms = result.elapsed.as_secs_f64() * 1000.0,
        "operation finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryConfig, MemoryStore};
    use crate::store::{ContainerSpec, PageSize, PartitionKey, StoreErrorKind, WriteMode};
    use serde_json::json;

    async fn store_with(n: usize) -> (MemoryStore, CollectionRef) {
        let store = MemoryStore::new(MemoryConfig::default());
        store
            .create_database_if_not_exists("db", Some(50_000))
            .await
            .unwrap();
        store
            .create_container_if_not_exists("db", &ContainerSpec::partitioned("c", "/id"))
            .await
            .unwrap();
        let target = CollectionRef::new("db", "c");
        for i in 0..n {
            let id = format!("item-{}", i);
            let doc = json!({"id": id, "rating": (i % 10) as f64 / 2.0})
                .as_object()
                .cloned()
                .unwrap();
            store
                .write(&target, &doc, &PartitionKey::value(&id), WriteMode::Upsert)
                .await
                .unwrap();
        }
        (store, target)
    }

    #[tokio::test]
    async fn auto_page_size_counts_match_page_sums() {
        let (store, target) = store_with(40).await;
        let d = OperationDescriptor::query(target, "SELECT * FROM c").unwrap();
        let r = run_operation(&store, &d).await.unwrap();
        assert_eq!(r.result_count, 40);
        assert!(r.pages >= 1);
        assert_eq!(r.page_item_counts.iter().sum::<usize>(), r.result_count);
        assert!(r.continuation.is_none());
    }

    #[tokio::test]
    async fn small_pages_drain_everything() {
        let (store, target) = store_with(40).await;
        let d = OperationDescriptor::query(target, "SELECT * FROM c")
            .unwrap()
            .with_page_size(PageSize::Fixed(7))
            .unwrap();
        let r = run_operation(&store, &d).await.unwrap();
        assert_eq!(r.result_count, 40);
        assert!(r.pages >= 6);
        assert!(r.page_item_counts.iter().all(|n| *n <= 7));
    }

    #[tokio::test]
    async fn single_page_stops_with_continuation() {
        let (store, target) = store_with(40).await;
        let d = OperationDescriptor::query(target, "SELECT * FROM c")
            .unwrap()
            .with_page_size(PageSize::Fixed(5))
            .unwrap()
            .single_page();
        let r = run_operation(&store, &d).await.unwrap();
        assert_eq!(r.pages, 1);
        assert_eq!(r.result_count, 5);
        assert!(r.continuation.is_some());
    }

    #[tokio::test]
    async fn streaming_fetches_exactly_one_page() {
        let (store, target) = store_with(250).await;
        let d = OperationDescriptor::query(target, "SELECT * FROM c")
            .unwrap()
            .streaming();
        let r = run_operation(&store, &d).await.unwrap();
        assert_eq!(r.pages, 1);
        assert!(r.result_count < 250);
        assert!(r.continuation.is_some());
        let excerpt = r.body_excerpt.unwrap();
        assert!(excerpt.starts_with('{'));
        assert!(excerpt.chars().count() <= EXCERPT_CHARS);
    }

    #[tokio::test]
    async fn repeated_queries_are_idempotent() {
        let (store, target) = store_with(30).await;
        let d = OperationDescriptor::query(target, "SELECT * FROM c WHERE c.rating >= 2.5").unwrap();
        let a = run_operation(&store, &d).await.unwrap();
        let b = run_operation(&store, &d).await.unwrap();
        assert_eq!(a.result_count, b.result_count);
        assert_eq!(a.result_count, 15);
    }

    #[tokio::test]
    async fn point_reads_return_one_or_not_found() {
        let (store, target) = store_with(3).await;
        let hit = OperationDescriptor::point_read(target.clone(), "item-1", PartitionKey::value("item-1"))
            .unwrap();
        let r = run_operation(&store, &hit).await.unwrap();
        assert_eq!(r.result_count, 1);
        assert_eq!(r.item.unwrap()["id"], "item-1");

        let miss = OperationDescriptor::point_read(target, "nobody", PartitionKey::value("nobody"))
            .unwrap();
        let err = run_operation(&store, &miss).await.unwrap_err();
        assert_eq!(err.store_error().unwrap().kind, StoreErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unknown_targets_are_setup_errors() {
        let (store, _) = store_with(0).await;
        let d = OperationDescriptor::query(CollectionRef::new("db", "nope"), "SELECT * FROM c")
            .unwrap();
        let err = run_operation(&store, &d).await.unwrap_err();
        assert!(matches!(err, RunError::Unresolved { .. }));
        assert!(err.to_string().contains("run scenario 0"));
    }

    #[tokio::test]
    async fn generated_writes_create_fresh_items() {
        let (store, target) = store_with(0).await;
        fn fresh() -> Result<(Document, PartitionKey), serde_json::Error> {
            let id = uuid::Uuid::new_v4().to_string();
            let doc = serde_json::from_value(json!({ "id": id }))?;
            Ok((doc, PartitionKey::Value(id)))
        }
        let d = OperationDescriptor::write(target, WritePayload::Generated(fresh), WriteMode::Create)
            .unwrap();
        let a = run_operation(&store, &d).await.unwrap();
        let b = run_operation(&store, &d).await.unwrap();
        assert_eq!(a.result_count, 1);
        assert_ne!(a.item.unwrap()["id"], b.item.unwrap()["id"]);
        assert!(a.cost_units > 0.0);
    }

    #[tokio::test]
    async fn unbound_shared_payload_is_rejected() {
        let (store, target) = store_with(0).await;
        let d = OperationDescriptor::write(target, WritePayload::Shared, WriteMode::Create).unwrap();
        let err = run_operation(&store, &d).await.unwrap_err();
        assert!(matches!(err, RunError::Payload(_)), "{}", err);
    }
}

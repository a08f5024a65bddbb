//! Store abstraction: trait, types, and builder factory.

pub mod config;
#[cfg(feature = "store-cosmos")]
pub mod auth;
#[cfg(feature = "store-cosmos")]
pub mod cosmos;
#[cfg(any(test, feature = "store-memory"))]
pub mod memory;
#[cfg(any(test, feature = "store-memory"))]
pub mod query;

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::Serialize;

/// Loosely-typed document as returned by queries.
pub type Document = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    Cosmos,
    #[cfg(any(test, feature = "store-memory"))]
    Memory,
}

#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub endpoint: String,
    pub key: String,
    pub preferred_region: Option<String>,
    pub application_name: Option<String>,
    pub allow_bulk: bool,
    pub params: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CollectionRef {
    pub database: String,
    pub container: String,
}

impl CollectionRef {
    pub fn new(database: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            container: container.into(),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.container)
    }
}

/// Partition key value for a request. `None` addresses the default
/// partition of a fixed (non-partitioned) container.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    Value(String),
    None,
}

impl PartitionKey {
    pub fn value(v: impl Into<String>) -> Self {
        PartitionKey::Value(v.into())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Value(v) => f.write_str(v),
            PartitionKey::None => f.write_str("<none>"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    Auto,
    Fixed(u32),
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::Auto => f.write_str("auto"),
            PageSize::Fixed(n) => write!(f, "{}", n),
        }
    }
}

/// Degree of parallelism across partitions. `Fixed(0)` queries serially.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Concurrency {
    #[default]
    Auto,
    Fixed(u32),
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Auto => f.write_str("auto"),
            Concurrency::Fixed(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Upsert,
}

/// Paging knobs forwarded with every page request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: PageSize,
    pub concurrency: Concurrency,
}

#[derive(Clone, Debug, Default)]
pub struct QueryPage {
    pub items: Vec<Document>,
    pub cost_units: f64,
    pub continuation: Option<String>,
}

/// A page returned without deserializing the documents.
#[derive(Clone, Debug)]
pub struct RawPage {
    pub body: Bytes,
    pub item_count: usize,
    pub cost_units: f64,
    pub continuation: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ItemResponse {
    pub item: Option<Document>,
    pub cost_units: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provisioned {
    pub id: String,
    pub created: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Throughput {
    pub current: u32,
    pub minimum: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexingPolicy {
    /// Every path indexed.
    Default,
    Tuned {
        included: Vec<String>,
        excluded: Vec<String>,
    },
}

impl IndexingPolicy {
    /// Whether a document path such as `/username` is indexed.
    pub fn indexes(&self, path: &str) -> bool {
        match self {
            IndexingPolicy::Default => true,
            IndexingPolicy::Tuned { included, excluded } => {
                let hit = |p: &String| path_matches(p, path);
                if included.iter().any(hit) {
                    return true;
                }
                !excluded.iter().any(hit)
            }
        }
    }
}

// `/username/*` matches `/username` and everything below; `/*` matches all.
fn path_matches(pattern: &str, path: &str) -> bool {
    let base = pattern
        .trim_end_matches("/?")
        .trim_end_matches("/*")
        .trim_end_matches('/');
    base.is_empty() || path == base || path.starts_with(&format!("{}/", base))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    pub id: String,
    /// `None` creates a legacy fixed container.
    pub partition_key_path: Option<String>,
    pub indexing_policy: IndexingPolicy,
}

impl ContainerSpec {
    pub fn partitioned(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partition_key_path: Some(path.into()),
            indexing_policy: IndexingPolicy::Default,
        }
    }

    pub fn fixed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partition_key_path: None,
            indexing_policy: IndexingPolicy::Default,
        }
    }

    pub fn with_indexing_policy(mut self, policy: IndexingPolicy) -> Self {
        self.indexing_policy = policy;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    Conflict,
    Throttled,
    BadRequest,
    Unauthorized,
    Transport,
    Service,
    Unsupported,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::Conflict => "conflict",
            StoreErrorKind::Throttled => "throttled",
            StoreErrorKind::BadRequest => "bad request",
            StoreErrorKind::Unauthorized => "unauthorized",
            StoreErrorKind::Transport => "transport",
            StoreErrorKind::Service => "service",
            StoreErrorKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("{kind}{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message).with_status(404)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Conflict, message).with_status(409)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::BadRequest, message).with_status(400)
    }

    /// Maps an HTTP status from the service onto an error kind.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 => StoreErrorKind::BadRequest,
            401 | 403 => StoreErrorKind::Unauthorized,
            404 => StoreErrorKind::NotFound,
            409 => StoreErrorKind::Conflict,
            429 => StoreErrorKind::Throttled,
            _ => StoreErrorKind::Service,
        };
        Self::new(kind, message).with_status(status)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Endpoint shown in the menu banner.
    fn endpoint(&self) -> &str;

    /// Toggle bulk execution for high-volume imports.
    fn set_bulk_mode(&self, enabled: bool);

    async fn create_database_if_not_exists(
        &self,
        id: &str,
        throughput: Option<u32>,
    ) -> Result<Provisioned, StoreError>;

    async fn create_container_if_not_exists(
        &self,
        database: &str,
        spec: &ContainerSpec,
    ) -> Result<Provisioned, StoreError>;

    async fn read_throughput(&self, database: &str) -> Result<Throughput, StoreError>;

    async fn replace_throughput(&self, database: &str, ru: u32) -> Result<Throughput, StoreError>;

    /// Fails with `NotFound` when the collection does not exist.
    async fn resolve(&self, target: &CollectionRef) -> Result<(), StoreError>;

    async fn query_page(
        &self,
        target: &CollectionRef,
        query: &str,
        request: &PageRequest,
        continuation: Option<&str>,
    ) -> Result<QueryPage, StoreError>;

    async fn query_page_raw(
        &self,
        target: &CollectionRef,
        query: &str,
        continuation: Option<&str>,
    ) -> Result<RawPage, StoreError>;

    async fn point_read(
        &self,
        target: &CollectionRef,
        id: &str,
        partition_key: &PartitionKey,
    ) -> Result<ItemResponse, StoreError>;

    async fn write(
        &self,
        target: &CollectionRef,
        document: &Document,
        partition_key: &PartitionKey,
        mode: WriteMode,
    ) -> Result<ItemResponse, StoreError>;

    async fn delete(
        &self,
        target: &CollectionRef,
        id: &str,
        partition_key: &PartitionKey,
    ) -> Result<ItemResponse, StoreError>;
}

pub struct StoreBuilder;

impl StoreBuilder {
    pub async fn connect(
        engine: Engine,
        opts: ConnectOptions,
    ) -> Result<Box<dyn DocumentStore>, StoreError> {
        match engine {
            Engine::Cosmos => {
                #[cfg(feature = "store-cosmos")]
                {
                    crate::store::cosmos::connect(opts).await
                }
                #[cfg(not(feature = "store-cosmos"))]
                {
                    let _ = opts;
                    Err(StoreError::new(
                        StoreErrorKind::Unsupported,
                        "cosmos feature disabled",
                    ))
                }
            }
            #[cfg(any(test, feature = "store-memory"))]
            Engine::Memory => crate::store::memory::connect(opts).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuned_policy_indexes_only_included_paths() {
        let policy = IndexingPolicy::Tuned {
            included: vec!["/username/*".into(), "/verifiedPurchase/*".into()],
            excluded: vec!["/*".into()],
        };
        assert!(policy.indexes("/username"));
        assert!(policy.indexes("/verifiedPurchase"));
        assert!(!policy.indexes("/prop1"));
        assert!(!policy.indexes("/user"));
        assert!(IndexingPolicy::Default.indexes("/prop1"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(StoreError::from_status(429, "x").kind, StoreErrorKind::Throttled);
        assert_eq!(StoreError::from_status(403, "x").kind, StoreErrorKind::Unauthorized);
        assert_eq!(StoreError::from_status(503, "x").kind, StoreErrorKind::Service);
        assert!(StoreError::from_status(404, "x").is_not_found());
    }

    #[test]
    fn error_display_includes_status() {
        let e = StoreError::conflict("id bob exists");
        assert_eq!(e.to_string(), "conflict (409): id bob exists");
        let e = StoreError::new(StoreErrorKind::Transport, "reset");
        assert_eq!(e.to_string(), "transport: reset");
    }
}

//! In-process store (feature `store-memory`): hashed physical partitions,
//! a deterministic request-unit cost model and optional simulated latency.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use super::query::{self, ParsedQuery};
use super::{
    CollectionRef, Concurrency, ConnectOptions, ContainerSpec, Document, DocumentStore,
    IndexingPolicy, ItemResponse, PageRequest, PageSize, PartitionKey, Provisioned, QueryPage,
    RawPage, StoreError, Throughput, WriteMode,
};

pub const QUERY_RU_PER_PARTITION: f64 = 2.8;
pub const QUERY_RU_PER_KB: f64 = 0.32;
pub const READ_RU_PER_KB: f64 = 1.0;
pub const WRITE_RU_BASE: f64 = 5.5;
pub const WRITE_RU_PER_INDEXED_TERM: f64 = 0.35;
pub const MIN_THROUGHPUT: u32 = 400;
const RU_PER_PHYSICAL_PARTITION: u32 = 10_000;
const DYNAMIC_PAGE_LIMIT: usize = 1000;
const STREAM_PAGE_LIMIT: usize = 100;
/// System property carrying the partition key of a migrated fixed container.
pub const FIXED_PARTITION_PROPERTY: &str = "_partitionKey";

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    pub endpoint: String,
    pub latency: Duration,
    pub home_region: String,
    pub preferred_region: Option<String>,
    pub cross_region_latency: Duration,
    pub max_partitions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            endpoint: "memory://local".into(),
            latency: Duration::ZERO,
            home_region: "West US 2".into(),
            preferred_region: None,
            cross_region_latency: Duration::ZERO,
            max_partitions: 64,
        }
    }
}

impl MemoryConfig {
    pub fn from_options(opts: &ConnectOptions) -> Result<Self, StoreError> {
        let mut cfg = MemoryConfig::default();
        if !opts.endpoint.is_empty() {
            cfg.endpoint = opts.endpoint.clone();
        }
        cfg.preferred_region = opts.preferred_region.clone();
        let ms = |key: &str| -> Result<Option<Duration>, StoreError> {
            match opts.params.get(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(|n| Some(Duration::from_millis(n)))
                    .map_err(|_| StoreError::bad_request(format!("{} must be an integer", key))),
                None => Ok(None),
            }
        };
        if let Some(d) = ms("latency_ms")? {
            cfg.latency = d;
        }
        if let Some(d) = ms("cross_region_latency_ms")? {
            cfg.cross_region_latency = d;
        }
        if let Some(r) = opts.params.get("home_region") {
            cfg.home_region = r.clone();
        }
        if let Some(v) = opts.params.get("max_partitions") {
            cfg.max_partitions = v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| StoreError::bad_request("max_partitions must be positive"))?;
        }
        Ok(cfg)
    }

    fn round_trip(&self) -> Duration {
        match &self.preferred_region {
            Some(r) if !r.eq_ignore_ascii_case(&self.home_region) => {
                self.latency + self.cross_region_latency
            }
            _ => self.latency,
        }
    }
}

type ItemKey = (Option<String>, String);

struct ContainerState {
    spec: ContainerSpec,
    partitions: Vec<BTreeMap<ItemKey, Document>>,
}

struct DatabaseState {
    throughput: Option<u32>,
    peak_throughput: u32,
    containers: BTreeMap<String, ContainerState>,
}

impl DatabaseState {
    fn physical_partitions(&self, cap: usize) -> usize {
        let n = (self.peak_throughput / RU_PER_PHYSICAL_PARTITION) as usize;
        n.clamp(1, cap)
    }
}

pub struct MemoryStore {
    config: MemoryConfig,
    bulk: AtomicBool,
    databases: RwLock<BTreeMap<String, DatabaseState>>,
}

pub async fn connect(opts: ConnectOptions) -> Result<Box<dyn DocumentStore>, StoreError> {
    let config = MemoryConfig::from_options(&opts)?;
    let store = MemoryStore::new(config);
    store.set_bulk_mode(opts.allow_bulk);
    Ok(Box::new(store))
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            bulk: AtomicBool::new(false),
            databases: RwLock::new(BTreeMap::new()),
        }
    }

    async fn delay(&self, round_trips: usize) {
        let d = self.config.round_trip() * round_trips as u32;
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }

    async fn write_delay(&self) {
        if !self.bulk.load(Ordering::Relaxed) {
            self.delay(1).await;
        }
    }

    /// Number of physical partitions backing a container.
    pub async fn partition_count(&self, target: &CollectionRef) -> Result<usize, StoreError> {
        let dbs = self.databases.read().await;
        let c = container(&dbs, target)?;
        Ok(c.partitions.len())
    }

    fn collect_page(
        c: &ContainerState,
        parsed: &ParsedQuery,
        limit: usize,
        continuation: Option<&str>,
    ) -> Result<(Vec<Document>, usize, Option<String>), StoreError> {
        let n = c.partitions.len();
        let order: Vec<usize> = match c
            .spec
            .partition_key_path
            .as_deref()
            .and_then(|p| parsed.partition_value(p))
        {
            Some(v) => vec![partition_index(Some(&value_key(v)), n)],
            None => (0..n).collect(),
        };
        let (start, mut offset) = match continuation {
            Some(tok) => parse_token(tok)?,
            None => (0, 0),
        };
        let mut items = Vec::new();
        let mut visited = 0;
        let mut next = None;
        for (k, &idx) in order.iter().enumerate().skip(start) {
            let mut skipped = 0;
            let mut taken = 0;
            let mut more_here = false;
            for doc in c.partitions[idx].values().filter(|d| parsed.matches(d)) {
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                if items.len() == limit {
                    more_here = true;
                    break;
                }
                items.push(doc.clone());
                taken += 1;
            }
            visited += 1;
            if more_here {
                next = Some(format!("{}:{}", k, offset + taken));
                break;
            }
            offset = 0;
            if items.len() == limit && k + 1 < order.len() {
                next = Some(format!("{}:0", k + 1));
                break;
            }
        }
        Ok((items, visited, next))
    }
}

fn parse_token(tok: &str) -> Result<(usize, usize), StoreError> {
    let bad = || StoreError::bad_request(format!("invalid continuation token '{}'", tok));
    let (k, o) = tok.split_once(':').ok_or_else(bad)?;
    Ok((k.parse().map_err(|_| bad())?, o.parse().map_err(|_| bad())?))
}

fn value_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn partition_index(key: Option<&str>, n: usize) -> usize {
    match key {
        Some(k) => {
            let mut h = DefaultHasher::new();
            k.hash(&mut h);
            (h.finish() % n as u64) as usize
        }
        None => 0,
    }
}

fn doc_kb(doc: &Document) -> f64 {
    let len = serde_json::to_vec(doc).map(|v| v.len()).unwrap_or(0);
    (len.div_ceil(1024)).max(1) as f64
}

fn indexed_terms(doc: &Document, policy: &IndexingPolicy) -> usize {
    fn walk(prefix: &str, v: &Value, policy: &IndexingPolicy, n: &mut usize) {
        match v {
            Value::Object(map) => {
                for (k, v) in map {
                    walk(&format!("{}/{}", prefix, k), v, policy, n);
                }
            }
            Value::Array(items) => {
                for v in items {
                    walk(&format!("{}/[]", prefix), v, policy, n);
                }
            }
            _ => {
                if policy.indexes(prefix) {
                    *n += 1;
                }
            }
        }
    }
    let mut n = 0;
    for (k, v) in doc {
        if k.starts_with('_') && k != FIXED_PARTITION_PROPERTY {
            continue;
        }
        walk(&format!("/{}", k), v, policy, &mut n);
    }
    n
}

fn write_cost(doc: &Document, policy: &IndexingPolicy) -> f64 {
    WRITE_RU_BASE * doc_kb(doc) + WRITE_RU_PER_INDEXED_TERM * indexed_terms(doc, policy) as f64
}

fn container<'a>(
    dbs: &'a BTreeMap<String, DatabaseState>,
    target: &CollectionRef,
) -> Result<&'a ContainerState, StoreError> {
    dbs.get(&target.database)
        .ok_or_else(|| StoreError::not_found(format!("database '{}' not found", target.database)))?
        .containers
        .get(&target.container)
        .ok_or_else(|| StoreError::not_found(format!("container '{}' not found", target)))
}

fn container_mut<'a>(
    dbs: &'a mut BTreeMap<String, DatabaseState>,
    target: &CollectionRef,
) -> Result<&'a mut ContainerState, StoreError> {
    dbs.get_mut(&target.database)
        .ok_or_else(|| StoreError::not_found(format!("database '{}' not found", target.database)))?
        .containers
        .get_mut(&target.container)
        .ok_or_else(|| StoreError::not_found(format!("container '{}' not found", target)))
}

impl ContainerState {
    fn key_property(&self) -> String {
        match &self.spec.partition_key_path {
            Some(p) => p.trim_start_matches('/').to_string(),
            None => FIXED_PARTITION_PROPERTY.to_string(),
        }
    }

    /// Checks the header partition key against the document and returns the item key.
    fn item_key(&self, doc: &Document, pk: &PartitionKey) -> Result<ItemKey, StoreError> {
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StoreError::bad_request("document is missing a string 'id'"))?;
        let prop = self.key_property();
        let in_doc = doc.get(&prop).filter(|v| !v.is_null()).map(value_key);
        match (pk, in_doc) {
            (PartitionKey::Value(v), Some(d)) if *v == d => Ok((Some(d), id.to_string())),
            (PartitionKey::None, None) => Ok((None, id.to_string())),
            _ => Err(StoreError::bad_request(
                "partition key extracted from document doesn't match the one specified in the request",
            )),
        }
    }

    fn slot(&self, key: &ItemKey) -> usize {
        partition_index(key.0.as_deref(), self.partitions.len())
    }
}

fn pk_key(pk: &PartitionKey) -> Option<String> {
    match pk {
        PartitionKey::Value(v) => Some(v.clone()),
        PartitionKey::None => None,
    }
}

fn parallelism(c: Concurrency, visited: usize) -> usize {
    match c {
        Concurrency::Auto => visited.max(1),
        Concurrency::Fixed(n) => (n as usize).max(1),
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn set_bulk_mode(&self, enabled: bool) {
        self.bulk.store(enabled, Ordering::Relaxed);
    }

    async fn create_database_if_not_exists(
        &self,
        id: &str,
        throughput: Option<u32>,
    ) -> Result<Provisioned, StoreError> {
        if let Some(t) = throughput {
            if t < MIN_THROUGHPUT {
                return Err(StoreError::bad_request(format!(
                    "throughput must be at least {}",
                    MIN_THROUGHPUT
                )));
            }
        }
        let mut dbs = self.databases.write().await;
        let created = !dbs.contains_key(id);
        if created {
            dbs.insert(
                id.to_string(),
                DatabaseState {
                    throughput,
                    peak_throughput: throughput.unwrap_or(0),
                    containers: BTreeMap::new(),
                },
            );
        }
        drop(dbs);
        self.delay(1).await;
        Ok(Provisioned {
            id: id.to_string(),
            created,
        })
    }

    async fn create_container_if_not_exists(
        &self,
        database: &str,
        spec: &ContainerSpec,
    ) -> Result<Provisioned, StoreError> {
        let mut dbs = self.databases.write().await;
        let db = dbs
            .get_mut(database)
            .ok_or_else(|| StoreError::not_found(format!("database '{}' not found", database)))?;
        let created = !db.containers.contains_key(&spec.id);
        if created {
            let n = match spec.partition_key_path {
                Some(_) => db.physical_partitions(self.config.max_partitions),
                None => 1,
            };
            db.containers.insert(
                spec.id.clone(),
                ContainerState {
                    spec: spec.clone(),
                    partitions: vec![BTreeMap::new(); n],
                },
            );
        }
        drop(dbs);
        self.delay(1).await;
        Ok(Provisioned {
            id: spec.id.clone(),
            created,
        })
    }

    async fn read_throughput(&self, database: &str) -> Result<Throughput, StoreError> {
        let dbs = self.databases.read().await;
        let db = dbs
            .get(database)
            .ok_or_else(|| StoreError::not_found(format!("database '{}' not found", database)))?;
        let current = db.throughput.ok_or_else(|| {
            StoreError::not_found(format!("no throughput provisioned on '{}'", database))
        })?;
        Ok(Throughput {
            current,
            minimum: MIN_THROUGHPUT.max(db.peak_throughput / 100),
        })
    }

    async fn replace_throughput(&self, database: &str, ru: u32) -> Result<Throughput, StoreError> {
        let current = self.read_throughput(database).await?;
        if ru < current.minimum {
            return Err(StoreError::bad_request(format!(
                "throughput {} is below the minimum {}",
                ru, current.minimum
            )));
        }
        let mut dbs = self.databases.write().await;
        if let Some(db) = dbs.get_mut(database) {
            db.throughput = Some(ru);
            db.peak_throughput = db.peak_throughput.max(ru);
        }
        drop(dbs);
        self.delay(1).await;
        Ok(Throughput {
            current: ru,
            minimum: current.minimum,
        })
    }

    async fn resolve(&self, target: &CollectionRef) -> Result<(), StoreError> {
        let dbs = self.databases.read().await;
        container(&dbs, target).map(|_| ())
    }

    async fn query_page(
        &self,
        target: &CollectionRef,
        query: &str,
        request: &PageRequest,
        continuation: Option<&str>,
    ) -> Result<QueryPage, StoreError> {
        let parsed = query::parse(query).map_err(|e| StoreError::bad_request(e.to_string()))?;
        let limit = match request.page_size {
            PageSize::Auto => DYNAMIC_PAGE_LIMIT,
            PageSize::Fixed(n) => (n as usize).max(1),
        };
        let (items, visited, next) = {
            let dbs = self.databases.read().await;
            let c = container(&dbs, target)?;
            Self::collect_page(c, &parsed, limit, continuation)?
        };
        let cost = visited as f64 * QUERY_RU_PER_PARTITION
            + items.iter().map(doc_kb).sum::<f64>() * QUERY_RU_PER_KB;
        let waves = visited.div_ceil(parallelism(request.concurrency, visited));
        self.delay(waves).await;
        tracing::trace!(collection = %target, visited, items = items.len(), cost, "memory query page");
        Ok(QueryPage {
            items,
            cost_units: cost,
            continuation: next,
        })
    }

    async fn query_page_raw(
        &self,
        target: &CollectionRef,
        query: &str,
        continuation: Option<&str>,
    ) -> Result<RawPage, StoreError> {
        let request = PageRequest {
            page_size: PageSize::Fixed(STREAM_PAGE_LIMIT as u32),
            concurrency: Concurrency::Auto,
        };
        let page = self.query_page(target, query, &request, continuation).await?;
        let count = page.items.len();
        let body = serde_json::to_vec(&json!({
            "_rid": target.container,
            "Documents": page.items,
            "_count": count,
        }))
        .map_err(|e| StoreError::bad_request(e.to_string()))?;
        Ok(RawPage {
            body: Bytes::from(body),
            item_count: count,
            cost_units: page.cost_units,
            continuation: page.continuation,
        })
    }

    async fn point_read(
        &self,
        target: &CollectionRef,
        id: &str,
        partition_key: &PartitionKey,
    ) -> Result<ItemResponse, StoreError> {
        let found = {
            let dbs = self.databases.read().await;
            let c = container(&dbs, target)?;
            let key = (pk_key(partition_key), id.to_string());
            c.partitions[c.slot(&key)].get(&key).cloned()
        };
        self.delay(1).await;
        match found {
            Some(doc) => Ok(ItemResponse {
                cost_units: READ_RU_PER_KB * doc_kb(&doc),
                item: Some(doc),
            }),
            None => Err(StoreError::not_found(format!(
                "item '{}' with partition key {} not found",
                id, partition_key
            ))),
        }
    }

    async fn write(
        &self,
        target: &CollectionRef,
        document: &Document,
        partition_key: &PartitionKey,
        mode: WriteMode,
    ) -> Result<ItemResponse, StoreError> {
        let cost = {
            let mut dbs = self.databases.write().await;
            let c = container_mut(&mut dbs, target)?;
            let key = c.item_key(document, partition_key)?;
            let slot = c.slot(&key);
            if mode == WriteMode::Create && c.partitions[slot].contains_key(&key) {
                return Err(StoreError::conflict(format!(
                    "item '{}' already exists in {}",
                    key.1, target
                )));
            }
            let cost = write_cost(document, &c.spec.indexing_policy);
            c.partitions[slot].insert(key, document.clone());
            cost
        };
        self.write_delay().await;
        Ok(ItemResponse {
            item: Some(document.clone()),
            cost_units: cost,
        })
    }

    async fn delete(
        &self,
        target: &CollectionRef,
        id: &str,
        partition_key: &PartitionKey,
    ) -> Result<ItemResponse, StoreError> {
        let removed = {
            let mut dbs = self.databases.write().await;
            let c = container_mut(&mut dbs, target)?;
            let key = (pk_key(partition_key), id.to_string());
            let slot = c.slot(&key);
            c.partitions[slot]
                .remove(&key)
                .map(|doc| (write_cost(&doc, &c.spec.indexing_policy), doc))
        };
        self.write_delay().await;
        match removed {
            Some((cost, doc)) => Ok(ItemResponse {
                item: Some(doc),
                cost_units: cost,
            }),
            None => Err(StoreError::not_found(format!(
                "item '{}' with partition key {} not found",
                id, partition_key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorKind;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    async fn seeded(throughput: u32) -> (MemoryStore, CollectionRef) {
        seeded_with(MemoryConfig::default(), throughput).await
    }

    async fn seeded_with(config: MemoryConfig, throughput: u32) -> (MemoryStore, CollectionRef) {
        let store = MemoryStore::new(config);
        store.set_bulk_mode(true);
        store
            .create_database_if_not_exists("db", Some(throughput))
            .await
            .unwrap();
        store
            .create_container_if_not_exists("db", &ContainerSpec::partitioned("c", "/username"))
            .await
            .unwrap();
        let target = CollectionRef::new("db", "c");
        for i in 0..25 {
            let user = if i % 5 == 0 { "Curt28" } else { "other" };
            let d = doc(json!({"id": format!("r{:02}", i), "username": user, "rating": i as f64 / 5.0}));
            store
                .write(&target, &d, &PartitionKey::value(user), WriteMode::Upsert)
                .await
                .unwrap();
        }
        store.set_bulk_mode(false);
        (store, target)
    }

    #[tokio::test]
    async fn serial_cross_partition_query_waits_per_partition() {
        let config = MemoryConfig {
            latency: Duration::from_millis(25),
            ..MemoryConfig::default()
        };
        let (store, target) = seeded_with(config, 40_000).await;
        let q = "SELECT * FROM c WHERE c.rating >= 1";
        let mut timed = Vec::new();
        for concurrency in [Concurrency::Auto, Concurrency::Fixed(0)] {
            let request = PageRequest {
                page_size: PageSize::Auto,
                concurrency,
            };
            let start = std::time::Instant::now();
            let page = store.query_page(&target, q, &request, None).await.unwrap();
            timed.push((start.elapsed(), page.items.len(), page.cost_units));
        }
        let (parallel, serial) = (timed[0], timed[1]);
        assert_eq!(parallel.1, serial.1);
        assert_eq!(parallel.2, serial.2);
        assert!(serial.0 >= Duration::from_millis(100), "{:?}", serial.0);
        assert!(parallel.0 < serial.0, "{:?} vs {:?}", parallel.0, serial.0);
    }

    #[test]
    fn connect_params_configure_the_simulator() {
        let opts = ConnectOptions {
            params: crate::store::config::parse_connect_kv(&[
                "max_partitions=4".to_string(),
                "latency_ms=5".to_string(),
            ]),
            ..ConnectOptions::default()
        };
        let cfg = MemoryConfig::from_options(&opts).unwrap();
        assert_eq!(cfg.max_partitions, 4);
        assert_eq!(cfg.latency, Duration::from_millis(5));
    }

    #[tokio::test]
    async fn partitions_follow_provisioned_throughput() {
        let (store, target) = seeded(40_000).await;
        assert_eq!(store.partition_count(&target).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn pages_resume_from_continuation() {
        let (store, target) = seeded(40_000).await;
        let request = PageRequest {
            page_size: PageSize::Fixed(4),
            concurrency: Concurrency::Auto,
        };
        let q = "SELECT * FROM c";
        let mut token: Option<String> = None;
        let mut seen = Vec::new();
        loop {
            let page = store
                .query_page(&target, q, &request, token.as_deref())
                .await
                .unwrap();
            assert!(page.items.len() <= 4);
            seen.extend(page.items.into_iter().map(|d| d["id"].clone()));
            token = page.continuation;
            if token.is_none() {
                break;
            }
        }
        seen.sort_by_key(|v| v.to_string());
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn partition_key_equality_targets_one_partition() {
        let (store, target) = seeded(40_000).await;
        let request = PageRequest::default();
        let page = store
            .query_page(&target, "SELECT * FROM c WHERE c.username = 'Curt28'", &request, None)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 5);
        let fanout = store
            .query_page(&target, "SELECT * FROM c WHERE c.rating >= 100", &request, None)
            .await
            .unwrap();
        assert!(fanout.items.is_empty());
        assert!(fanout.cost_units >= 4.0 * QUERY_RU_PER_PARTITION);
        assert!(page.cost_units < fanout.cost_units);
    }

    #[tokio::test]
    async fn create_conflicts_and_mismatched_keys_are_rejected() {
        let (store, target) = seeded(400).await;
        let d = doc(json!({"id": "r00", "username": "Curt28"}));
        let err = store
            .write(&target, &d, &PartitionKey::value("Curt28"), WriteMode::Create)
            .await
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Conflict);
        let err = store
            .write(&target, &d, &PartitionKey::value("someone"), WriteMode::Upsert)
            .await
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn fixed_container_accepts_none_and_migrated_keys() {
        let store = MemoryStore::new(MemoryConfig::default());
        store.create_database_if_not_exists("fx", None).await.unwrap();
        store
            .create_container_if_not_exists("fx", &ContainerSpec::fixed("legacy"))
            .await
            .unwrap();
        let target = CollectionRef::new("fx", "legacy");
        let bob = doc(json!({"id": "bob", "status": "learning"}));
        store
            .write(&target, &bob, &PartitionKey::None, WriteMode::Create)
            .await
            .unwrap();
        let alice = doc(json!({"id": "alice", "_partitionKey": "alice", "status": "partitioning"}));
        store
            .write(&target, &alice, &PartitionKey::value("alice"), WriteMode::Create)
            .await
            .unwrap();
        assert!(store.point_read(&target, "bob", &PartitionKey::None).await.is_ok());
        let miss = store
            .point_read(&target, "alice", &PartitionKey::None)
            .await
            .unwrap_err();
        assert!(miss.is_not_found());
        store
            .delete(&target, "alice", &PartitionKey::value("alice"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tuned_indexing_lowers_write_cost() {
        let store = MemoryStore::new(MemoryConfig::default());
        store.create_database_if_not_exists("ix", Some(400)).await.unwrap();
        let tuned = IndexingPolicy::Tuned {
            included: vec!["/username/*".into()],
            excluded: vec!["/*".into()],
        };
        store
            .create_container_if_not_exists("ix", &ContainerSpec::partitioned("all", "/partitionKey"))
            .await
            .unwrap();
        store
            .create_container_if_not_exists(
                "ix",
                &ContainerSpec::partitioned("few", "/partitionKey").with_indexing_policy(tuned),
            )
            .await
            .unwrap();
        let d = doc(json!({"id": "1", "partitionKey": "u", "username": "u", "a": 1, "b": 2, "c": 3}));
        let pk = PartitionKey::value("u");
        let all = store
            .write(&CollectionRef::new("ix", "all"), &d, &pk, WriteMode::Create)
            .await
            .unwrap();
        let few = store
            .write(&CollectionRef::new("ix", "few"), &d, &pk, WriteMode::Create)
            .await
            .unwrap();
        assert!(few.cost_units < all.cost_units);
    }

    #[tokio::test]
    async fn throughput_scales_down_to_minimum_only() {
        let store = MemoryStore::new(MemoryConfig::default());
        store
            .create_database_if_not_exists("big", Some(300_000))
            .await
            .unwrap();
        let t = store.read_throughput("big").await.unwrap();
        assert_eq!(t.current, 300_000);
        assert_eq!(t.minimum, 3_000);
        assert!(store.replace_throughput("big", 1_000).await.is_err());
        let t = store.replace_throughput("big", t.minimum).await.unwrap();
        assert_eq!(t.current, 3_000);
    }

    #[tokio::test]
    async fn unknown_collection_does_not_resolve() {
        let (store, _) = seeded(400).await;
        let err = store
            .resolve(&CollectionRef::new("db", "missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn cross_region_adds_latency() {
        let mut cfg = MemoryConfig {
            latency: Duration::from_millis(2),
            cross_region_latency: Duration::from_millis(50),
            ..MemoryConfig::default()
        };
        assert_eq!(cfg.round_trip(), Duration::from_millis(2));
        cfg.preferred_region = Some("East US 2".into());
        assert_eq!(cfg.round_trip(), Duration::from_millis(52));
    }
}

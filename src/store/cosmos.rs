//! Cosmos DB SQL API adapter (feature `store-cosmos`) over the REST gateway.
//!
//! Requests are signed with the account master key. The adapter never
//! retries: throttling and every other service error is handed back to the
//! caller with its HTTP status.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use super::auth::{MasterKey, http_date};
use super::{
    CollectionRef, Concurrency, ConnectOptions, ContainerSpec, Document, DocumentStore,
    IndexingPolicy, ItemResponse, PageRequest, PageSize, PartitionKey, Provisioned, QueryPage,
    RawPage, StoreError, StoreErrorKind, Throughput, WriteMode,
};

const API_VERSION: &str = "2018-12-31";
/// Last API version that can still create containers without a partition key.
const LEGACY_API_VERSION: &str = "2018-09-17";
const DEFAULT_MIN_THROUGHPUT: u32 = 400;

pub struct CosmosStore {
    endpoint: String,
    read_endpoint: String,
    key: MasterKey,
    http: reqwest::Client,
}

struct Call {
    method: Method,
    resource_type: &'static str,
    resource_link: String,
    path: String,
    headers: Vec<(&'static str, String)>,
    body: Option<Vec<u8>>,
    content_type: &'static str,
    api_version: &'static str,
    read: bool,
}

impl Call {
    fn new(method: Method, resource_type: &'static str, link: impl Into<String>) -> Self {
        let link = link.into();
        Self {
            method,
            resource_type,
            path: link.clone(),
            resource_link: link,
            headers: Vec::new(),
            body: None,
            content_type: "application/json",
            api_version: API_VERSION,
            read: false,
        }
    }

    /// Feed operations (create, query) address the parent link but a child path.
    fn feed(method: Method, resource_type: &'static str, parent: impl Into<String>) -> Self {
        let parent = parent.into();
        let path = if parent.is_empty() {
            resource_type.to_string()
        } else {
            format!("{}/{}", parent, resource_type)
        };
        let mut call = Self::new(method, resource_type, parent);
        call.path = path;
        call
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn json(mut self, body: &Value) -> Self {
        self.body = Some(body.to_string().into_bytes());
        self
    }

    fn query(mut self, text: &str, parameters: Value) -> Self {
        self.body = Some(json!({ "query": text, "parameters": parameters }).to_string().into_bytes());
        self.content_type = "application/query+json";
        self.header("x-ms-documentdb-isquery", "True")
    }

    fn reading(mut self) -> Self {
        self.read = true;
        self
    }
}

struct Reply {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn charge(&self) -> f64 {
        self.header("x-ms-request-charge")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0)
    }

    fn continuation(&self) -> Option<String> {
        self.header("x-ms-continuation")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn json(&self) -> Result<Value, StoreError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            StoreError::new(StoreErrorKind::Service, format!("invalid response body: {}", e))
                .with_status(self.status)
        })
    }
}

fn partition_header(pk: &PartitionKey) -> String {
    match pk {
        PartitionKey::Value(v) => json!([v]).to_string(),
        PartitionKey::None => "[{}]".to_string(),
    }
}

fn container_link(target: &CollectionRef) -> String {
    format!("dbs/{}/colls/{}", target.database, target.container)
}

fn indexing_policy_json(policy: &IndexingPolicy) -> Option<Value> {
    match policy {
        IndexingPolicy::Default => None,
        IndexingPolicy::Tuned { included, excluded } => Some(json!({
            "indexingMode": "consistent",
            "automatic": true,
            "includedPaths": included.iter().map(|p| json!({ "path": p })).collect::<Vec<_>>(),
            "excludedPaths": excluded.iter().map(|p| json!({ "path": p })).collect::<Vec<_>>(),
        })),
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

fn documents(v: &Value) -> Vec<Document> {
    v.get("Documents")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|d| d.as_object().cloned()).collect())
        .unwrap_or_default()
}

pub async fn connect(opts: ConnectOptions) -> Result<Box<dyn DocumentStore>, StoreError> {
    let endpoint = opts.endpoint.trim_end_matches('/').to_string();
    url::Url::parse(&endpoint).map_err(|e| {
        StoreError::new(StoreErrorKind::BadRequest, format!("invalid endpoint '{}': {}", endpoint, e))
    })?;
    let key = MasterKey::from_base64(&opts.key)?;
    let agent = match &opts.application_name {
        Some(app) => format!("cosmos-tune/{} {}", env!("CARGO_PKG_VERSION"), app),
        None => format!("cosmos-tune/{}", env!("CARGO_PKG_VERSION")),
    };
    let http = reqwest::Client::builder()
        .user_agent(agent)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| StoreError::new(StoreErrorKind::Transport, e.to_string()))?;
    let mut store = CosmosStore {
        read_endpoint: endpoint.clone(),
        endpoint,
        key,
        http,
    };
    if let Some(region) = &opts.preferred_region {
        match store.regional_endpoint(region).await? {
            Some(ep) => {
                tracing::info!(region = %region, endpoint = %ep, "routing reads to preferred region");
                store.read_endpoint = ep;
            }
            None => tracing::warn!(region = %region, "preferred region not found in account locations"),
        }
    }
    Ok(Box::new(store))
}

impl CosmosStore {
    async fn send(&self, call: Call) -> Result<Reply, StoreError> {
        let date = http_date(Utc::now());
        let auth = self
            .key
            .sign(call.method.as_str(), call.resource_type, &call.resource_link, &date)?;
        let base = if call.read { &self.read_endpoint } else { &self.endpoint };
        let url = format!("{}/{}", base, call.path);
        let mut req = self
            .http
            .request(call.method.clone(), &url)
            .header("x-ms-date", &date)
            .header("x-ms-version", call.api_version)
            .header("authorization", auth)
            .header("content-type", call.content_type);
        for (name, value) in &call.headers {
            req = req.header(*name, value);
        }
        if let Some(body) = call.body {
            req = req.body(body);
        }
        let response = req
            .send()
            .await
            .map_err(|e| StoreError::new(StoreErrorKind::Transport, e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| StoreError::new(StoreErrorKind::Transport, e.to_string()))?;
        let reply = Reply {
            status,
            headers,
            body,
        };
        tracing::debug!(
            method = %call.method,
            resource = %call.resource_link,
            status,
            request_charge = reply.charge(),
            "cosmos request"
        );
        if (200..300).contains(&status) {
            Ok(reply)
        } else {
            Err(StoreError::from_status(status, error_message(&reply.body)))
        }
    }

    async fn regional_endpoint(&self, region: &str) -> Result<Option<String>, StoreError> {
        let account = self.send(Call::new(Method::GET, "", "")).await?.json()?;
        let found = account
            .get("readableLocations")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|loc| {
                loc.get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|n| n.eq_ignore_ascii_case(region))
            })
            .and_then(|loc| loc.get("databaseAccountEndpoint").and_then(Value::as_str))
            .map(|ep| ep.trim_end_matches('/').to_string());
        Ok(found)
    }

    async fn read_offer(&self, database: &str) -> Result<Value, StoreError> {
        let db = self
            .send(Call::new(Method::GET, "dbs", format!("dbs/{}", database)))
            .await?
            .json()?;
        let self_link = db
            .get("_self")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::new(StoreErrorKind::Service, "database has no _self link"))?;
        let offers = self
            .send(Call::feed(Method::POST, "offers", "").query(
                "SELECT * FROM root WHERE root.resource = @link",
                json!([{ "name": "@link", "value": self_link }]),
            ))
            .await?
            .json()?;
        offers
            .get("Offers")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .cloned()
            .ok_or_else(|| {
                StoreError::not_found(format!("no throughput provisioned on '{}'", database))
            })
    }

    async fn offer_minimum(&self, offer_id: &str) -> Result<u32, StoreError> {
        let reply = self
            .send(Call::new(Method::GET, "offers", offer_id.to_lowercase()).header(
                "x-ms-cosmos-populate-partition-statistics",
                "True",
            ))
            .await?;
        Ok(reply
            .header("x-ms-cosmos-min-throughput")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MIN_THROUGHPUT))
    }
}

fn offer_throughput(offer: &Value) -> u32 {
    offer
        .pointer("/content/offerThroughput")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32
}

fn offer_id(offer: &Value) -> Result<String, StoreError> {
    offer
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::new(StoreErrorKind::Service, "offer without id"))
}

#[async_trait::async_trait]
impl DocumentStore for CosmosStore {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn set_bulk_mode(&self, enabled: bool) {
        // The REST gateway has no bulk mode; imports stay concurrent single-item upserts.
        tracing::debug!(enabled, "bulk mode ignored by the gateway client");
    }

    async fn create_database_if_not_exists(
        &self,
        id: &str,
        throughput: Option<u32>,
    ) -> Result<Provisioned, StoreError> {
        let mut call = Call::feed(Method::POST, "dbs", "").json(&json!({ "id": id }));
        if let Some(t) = throughput {
            call = call.header("x-ms-offer-throughput", t.to_string());
        }
        match self.send(call).await {
            Ok(_) => Ok(Provisioned {
                id: id.to_string(),
                created: true,
            }),
            Err(e) if e.kind == StoreErrorKind::Conflict => Ok(Provisioned {
                id: id.to_string(),
                created: false,
            }),
            Err(e) => Err(e),
        }
    }

    async fn create_container_if_not_exists(
        &self,
        database: &str,
        spec: &ContainerSpec,
    ) -> Result<Provisioned, StoreError> {
        let mut body = json!({ "id": spec.id });
        let mut call = Call::feed(Method::POST, "colls", format!("dbs/{}", database));
        match &spec.partition_key_path {
            Some(path) => {
                body["partitionKey"] = json!({ "paths": [path], "kind": "Hash", "version": 2 });
            }
            None => call.api_version = LEGACY_API_VERSION,
        }
        if let Some(policy) = indexing_policy_json(&spec.indexing_policy) {
            body["indexingPolicy"] = policy;
        }
        match self.send(call.json(&body)).await {
            Ok(_) => Ok(Provisioned {
                id: spec.id.clone(),
                created: true,
            }),
            Err(e) if e.kind == StoreErrorKind::Conflict => Ok(Provisioned {
                id: spec.id.clone(),
                created: false,
            }),
            Err(e) => Err(e),
        }
    }

    async fn read_throughput(&self, database: &str) -> Result<Throughput, StoreError> {
        let offer = self.read_offer(database).await?;
        let minimum = self.offer_minimum(&offer_id(&offer)?).await?;
        Ok(Throughput {
            current: offer_throughput(&offer),
            minimum,
        })
    }

    async fn replace_throughput(&self, database: &str, ru: u32) -> Result<Throughput, StoreError> {
        let mut offer = self.read_offer(database).await?;
        let id = offer_id(&offer)?;
        let minimum = self.offer_minimum(&id).await?;
        if let Some(content) = offer.get_mut("content").and_then(Value::as_object_mut) {
            content.insert("offerThroughput".into(), json!(ru));
        }
        let updated = self
            .send(Call::new(Method::PUT, "offers", id.to_lowercase()).json(&offer))
            .await?
            .json()?;
        Ok(Throughput {
            current: offer_throughput(&updated),
            minimum,
        })
    }

    async fn resolve(&self, target: &CollectionRef) -> Result<(), StoreError> {
        self.send(Call::new(Method::GET, "colls", container_link(target)).reading())
            .await
            .map(|_| ())
    }

    async fn query_page(
        &self,
        target: &CollectionRef,
        query: &str,
        request: &PageRequest,
        continuation: Option<&str>,
    ) -> Result<QueryPage, StoreError> {
        let max_items = match request.page_size {
            PageSize::Auto => "-1".to_string(),
            PageSize::Fixed(n) => n.to_string(),
        };
        let parallel = match request.concurrency {
            Concurrency::Fixed(0) => "False",
            _ => "True",
        };
        let mut call = Call::feed(Method::POST, "docs", container_link(target))
            .query(query, json!([]))
            .header("x-ms-documentdb-query-enablecrosspartition", "True")
            .header("x-ms-documentdb-query-parallelizecrosspartitionquery", parallel)
            .header("x-ms-max-item-count", max_items)
            .reading();
        if let Some(tok) = continuation {
            call = call.header("x-ms-continuation", tok);
        }
        let reply = self.send(call).await?;
        Ok(QueryPage {
            items: documents(&reply.json()?),
            cost_units: reply.charge(),
            continuation: reply.continuation(),
        })
    }

    async fn query_page_raw(
        &self,
        target: &CollectionRef,
        query: &str,
        continuation: Option<&str>,
    ) -> Result<RawPage, StoreError> {
        let mut call = Call::feed(Method::POST, "docs", container_link(target))
            .query(query, json!([]))
            .header("x-ms-documentdb-query-enablecrosspartition", "True")
            .reading();
        if let Some(tok) = continuation {
            call = call.header("x-ms-continuation", tok);
        }
        let reply = self.send(call).await?;
        let item_count = reply
            .header("x-ms-item-count")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Ok(RawPage {
            item_count,
            cost_units: reply.charge(),
            continuation: reply.continuation(),
            body: reply.body,
        })
    }

    async fn point_read(
        &self,
        target: &CollectionRef,
        id: &str,
        partition_key: &PartitionKey,
    ) -> Result<ItemResponse, StoreError> {
        let link = format!("{}/docs/{}", container_link(target), id);
        let reply = self
            .send(
                Call::new(Method::GET, "docs", link)
                    .header("x-ms-documentdb-partitionkey", partition_header(partition_key))
                    .reading(),
            )
            .await?;
        Ok(ItemResponse {
            item: reply.json()?.as_object().cloned(),
            cost_units: reply.charge(),
        })
    }

    async fn write(
        &self,
        target: &CollectionRef,
        document: &Document,
        partition_key: &PartitionKey,
        mode: WriteMode,
    ) -> Result<ItemResponse, StoreError> {
        let upsert = if mode == WriteMode::Upsert { "True" } else { "False" };
        let reply = self
            .send(
                Call::feed(Method::POST, "docs", container_link(target))
                    .json(&Value::Object(document.clone()))
                    .header("x-ms-documentdb-partitionkey", partition_header(partition_key))
                    .header("x-ms-documentdb-is-upsert", upsert),
            )
            .await?;
        Ok(ItemResponse {
            item: reply.json()?.as_object().cloned(),
            cost_units: reply.charge(),
        })
    }

    async fn delete(
        &self,
        target: &CollectionRef,
        id: &str,
        partition_key: &PartitionKey,
    ) -> Result<ItemResponse, StoreError> {
        let link = format!("{}/docs/{}", container_link(target), id);
        let reply = self
            .send(
                Call::new(Method::DELETE, "docs", link)
                    .header("x-ms-documentdb-partitionkey", partition_header(partition_key)),
            )
            .await?;
        Ok(ItemResponse {
            item: None,
            cost_units: reply.charge(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_headers() {
        assert_eq!(partition_header(&PartitionKey::value("Curt28")), r#"["Curt28"]"#);
        assert_eq!(partition_header(&PartitionKey::None), "[{}]");
    }

    #[test]
    fn feed_calls_sign_the_parent_link() {
        let call = Call::feed(Method::POST, "docs", "dbs/PartitioningDemo/colls/UserReviews_v2");
        assert_eq!(call.resource_link, "dbs/PartitioningDemo/colls/UserReviews_v2");
        assert_eq!(call.path, "dbs/PartitioningDemo/colls/UserReviews_v2/docs");
        let root = Call::feed(Method::POST, "dbs", "");
        assert_eq!(root.resource_link, "");
        assert_eq!(root.path, "dbs");
    }

    #[test]
    fn tuned_policy_serializes_paths() {
        let v = indexing_policy_json(&IndexingPolicy::Tuned {
            included: vec!["/username/*".into()],
            excluded: vec!["/*".into()],
        })
        .unwrap();
        assert_eq!(v["includedPaths"][0]["path"], "/username/*");
        assert_eq!(v["excludedPaths"][0]["path"], "/*");
        assert!(indexing_policy_json(&IndexingPolicy::Default).is_none());
    }

    #[test]
    fn service_messages_are_extracted() {
        assert_eq!(error_message(br#"{"code":"NotFound","message":"gone"}"#), "gone");
        assert_eq!(error_message(b"plain"), "plain");
    }

    #[tokio::test]
    async fn connect_rejects_bad_endpoint() {
        let opts = ConnectOptions {
            endpoint: "not a url".into(),
            key: "a2V5".into(),
            ..ConnectOptions::default()
        };
        assert!(connect(opts).await.is_err());
    }

    #[test]
    fn bulk_mode_keeps_gateway_routing() {
        let store = CosmosStore {
            endpoint: "https://acct.documents.azure.com/".into(),
            read_endpoint: "https://acct-westus.documents.azure.com/".into(),
            key: MasterKey::from_base64("a2V5").unwrap(),
            http: reqwest::Client::new(),
        };
        store.set_bulk_mode(true);
        store.set_bulk_mode(false);
        assert_eq!(store.endpoint(), "https://acct.documents.azure.com/");
        assert_eq!(store.read_endpoint, "https://acct-westus.documents.azure.com/");
    }
}

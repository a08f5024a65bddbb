//! Resource provisioning and data import for scenario 0, plus the legacy
//! container used by scenario 8.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::bulk::{BulkReport, BulkTarget, bulk_load};
use crate::dataset::{self, DatasetSource};
use crate::output::{format_elapsed, print_banner};
use crate::store::{
    CollectionRef, ContainerSpec, DocumentStore, IndexingPolicy, Provisioned, Throughput,
};

use super::{
    DEFAULT_INDEXING, FIXED_CONTAINER, FIXED_DB, INDEXING_DB, PARTITIONING_DB, REVIEWS_BY_ID,
    REVIEWS_BY_USERNAME, TUNED_INDEXING,
};

/// Throughput the partitioning demo is created with, so the import spreads
/// over many physical partitions.
pub const PARTITIONING_THROUGHPUT: u32 = 300_000;
pub const INDEXING_THROUGHPUT: u32 = 400;

#[derive(Clone, Debug)]
pub struct SetupOptions {
    pub dataset: DatasetSource,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            dataset: DatasetSource::Url(dataset::DEFAULT_DATASET_URL.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SetupReport {
    pub bulk: BulkReport,
    pub imported: usize,
    pub skipped: usize,
    pub scaled_to: Throughput,
}

pub fn tuned_indexing_policy() -> IndexingPolicy {
    IndexingPolicy::Tuned {
        included: vec![
            "/username/*".into(),
            "/productName/*".into(),
            "/verifiedPurchase/*".into(),
        ],
        excluded: vec!["/*".into()],
    }
}

fn created(p: &Provisioned, kind: &str, suffix: &str) {
    let verb = if p.created { "Created" } else { "Found existing" };
    println!("\t{} {} {}{}", verb, kind, p.id, suffix);
}

pub async fn run_setup(store: &dyn DocumentStore, opts: &SetupOptions) -> Result<SetupReport> {
    print_banner("Running setup...");
    println!();

    let db = store
        .create_database_if_not_exists(PARTITIONING_DB, Some(PARTITIONING_THROUGHPUT))
        .await
        .with_context(|| format!("creating database {}", PARTITIONING_DB))?;
    created(&db, "database", "");
    let v1 = store
        .create_container_if_not_exists(PARTITIONING_DB, &ContainerSpec::partitioned(REVIEWS_BY_ID, "/id"))
        .await?;
    created(&v1, "container", " with partition key 'id'");
    let v2 = store
        .create_container_if_not_exists(
            PARTITIONING_DB,
            &ContainerSpec::partitioned(REVIEWS_BY_USERNAME, "/username"),
        )
        .await?;
    created(&v2, "container", " with partition key 'username'");

    let db = store
        .create_database_if_not_exists(INDEXING_DB, Some(INDEXING_THROUGHPUT))
        .await
        .with_context(|| format!("creating database {}", INDEXING_DB))?;
    created(&db, "database", "");
    let default = store
        .create_container_if_not_exists(INDEXING_DB, &ContainerSpec::partitioned(DEFAULT_INDEXING, "/partitionKey"))
        .await?;
    created(&default, "container", " with default indexing policy");
    let tuned = store
        .create_container_if_not_exists(
            INDEXING_DB,
            &ContainerSpec::partitioned(TUNED_INDEXING, "/partitionKey")
                .with_indexing_policy(tuned_indexing_policy()),
        )
        .await?;
    created(&tuned, "container", " with tuned indexing policy");

    println!();
    print_banner("Starting data import: this will take a few minutes...");
    let data = dataset::load(&opts.dataset).await?;
    println!("\tFinished loading data from {}", opts.dataset);
    if data.skipped > 0 {
        tracing::warn!(skipped = data.skipped, "dataset entries with unknown documentType were skipped");
    }
    println!("\tWriting data into Cosmos containers...");

    let targets = [
        BulkTarget::new(CollectionRef::new(PARTITIONING_DB, REVIEWS_BY_ID), "/id"),
        BulkTarget::new(CollectionRef::new(PARTITIONING_DB, REVIEWS_BY_USERNAME), "/username"),
    ];
    store.set_bulk_mode(true);
    let bulk = bulk_load(store, &data.records, &targets).await;
    let imported = bulk.imported(targets.len());
    println!(
        "\tImport of {} items into {} and {} containers completed. Total time: {}",
        imported,
        REVIEWS_BY_ID,
        REVIEWS_BY_USERNAME,
        format_elapsed(bulk.elapsed)
    );
    if bulk.failed > 0 {
        println!(
            "{}",
            format!("\t{} of {} writes failed; rerun setup to retry them", bulk.failed, bulk.attempted).red()
        );
    }

    let scaled = scale_to_minimum(store, PARTITIONING_DB).await;
    store.set_bulk_mode(false);
    let scaled_to = scaled?;
    println!(
        "\tScaled {} database down to minimum {} RU/s",
        PARTITIONING_DB, scaled_to.current
    );

    Ok(SetupReport {
        bulk,
        imported,
        skipped: data.skipped,
        scaled_to,
    })
}

async fn scale_to_minimum(store: &dyn DocumentStore, database: &str) -> Result<Throughput> {
    let current = store
        .read_throughput(database)
        .await
        .with_context(|| format!("reading throughput of {}", database))?;
    tracing::debug!(database, current = current.current, minimum = current.minimum, "scaling down");
    Ok(store.replace_throughput(database, current.minimum).await?)
}

/// Creates the non-partitioned container if it is missing.
pub async fn prepare_fixed_container(store: &dyn DocumentStore) -> Result<()> {
    print_banner("Scaling a fixed container using partition keys...");
    store
        .create_database_if_not_exists(FIXED_DB, None)
        .await
        .with_context(|| format!("creating database {}", FIXED_DB))?;
    let c = store
        .create_container_if_not_exists(FIXED_DB, &ContainerSpec::fixed(FIXED_CONTAINER))
        .await
        .with_context(|| format!("creating fixed container {}", FIXED_CONTAINER))?;
    if c.created {
        tracing::info!(container = FIXED_CONTAINER, "created fixed container");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FEATURED_USER;
    use crate::store::PartitionKey;
    use crate::store::memory::{MemoryConfig, MemoryStore};

    fn synthetic() -> SetupOptions {
        SetupOptions {
            dataset: DatasetSource::Synthetic { users: 25, seed: 5 },
        }
    }

    #[tokio::test]
    async fn setup_provisions_imports_and_scales_down() {
        let store = MemoryStore::new(MemoryConfig::default());
        let report = run_setup(&store, &synthetic()).await.unwrap();
        let expected = dataset::synthetic(25, 5).len();
        assert_eq!(report.bulk.records, expected);
        assert_eq!(report.imported, expected);
        assert_eq!(report.bulk.failed, 0);
        assert_eq!(report.scaled_to.current, PARTITIONING_THROUGHPUT / 100);

        let v2 = CollectionRef::new(PARTITIONING_DB, REVIEWS_BY_USERNAME);
        let user = store
            .point_read(&v2, FEATURED_USER, &PartitionKey::value(FEATURED_USER))
            .await
            .unwrap();
        assert_eq!(user.item.unwrap()["documentType"], "user");
        for c in [DEFAULT_INDEXING, TUNED_INDEXING] {
            store.resolve(&CollectionRef::new(INDEXING_DB, c)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn setup_is_idempotent() {
        let store = MemoryStore::new(MemoryConfig::default());
        run_setup(&store, &synthetic()).await.unwrap();
        let again = run_setup(&store, &synthetic()).await.unwrap();
        assert_eq!(again.bulk.failed, 0);
    }

    #[tokio::test]
    async fn fixed_container_preparation_is_repeatable() {
        let store = MemoryStore::new(MemoryConfig::default());
        prepare_fixed_container(&store).await.unwrap();
        prepare_fixed_container(&store).await.unwrap();
        store
            .resolve(&CollectionRef::new(FIXED_DB, FIXED_CONTAINER))
            .await
            .unwrap();
    }
}

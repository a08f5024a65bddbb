use crate::dataset::{FEATURED_USER, detailed_review};
use crate::descriptor::{DescriptorError, OperationDescriptor, OperationKind, WritePayload};
use crate::records::{UserTaskItem, to_document};
use crate::store::{CollectionRef, Concurrency, Document, PageSize, PartitionKey, WriteMode};

use super::{
    DEFAULT_INDEXING, FIXED_CONTAINER, FIXED_DB, INDEXING_DB, PARTITIONING_DB, Preparation,
    REVIEWS_BY_ID, REVIEWS_BY_USERNAME, ScenarioDefinition, ScenarioKey, ScenarioStep,
    TUNED_INDEXING,
};

const HIGH_RATING_QUERY: &str = "SELECT * FROM c WHERE c.rating >= 4.7";

fn by_username_query() -> String {
    format!("SELECT * FROM c WHERE c.username = '{}'", FEATURED_USER)
}

fn reviews(container: &str) -> CollectionRef {
    CollectionRef::new(PARTITIONING_DB, container)
}

/// Step whose heading is derived from the query it runs.
fn step(descriptor: OperationDescriptor) -> ScenarioStep {
    let container = descriptor.target().container.clone();
    let title = match descriptor.kind() {
        OperationKind::Query { text } if descriptor.options().streaming => {
            format!("Running query with stream API: {} against container {}", text, container)
        }
        OperationKind::Query { text } if descriptor.options().page_limit.is_some() => {
            format!("Running query without stream API: {} against container {}", text, container)
        }
        OperationKind::Query { text } => {
            format!("Running query: {} against container {}", text, container)
        }
        OperationKind::PointRead { id, partition_key } => format!(
            "Running point read: id '{}', partition key '{}' against container {}",
            id, partition_key, container
        ),
        OperationKind::Write { .. } => format!("Write item to container {}", container),
        OperationKind::Delete { id, .. } => {
            format!("Delete item '{}' from container {}", id, container)
        }
    };
    ScenarioStep {
        title,
        descriptor,
        best_effort: false,
    }
}

fn titled(title: impl Into<String>, descriptor: OperationDescriptor) -> ScenarioStep {
    ScenarioStep {
        title: title.into(),
        ..step(descriptor)
    }
}

fn best_effort(descriptor: OperationDescriptor) -> ScenarioStep {
    ScenarioStep {
        best_effort: true,
        ..step(descriptor)
    }
}

/// A fresh detailed review keyed by its username.
pub fn detailed_review_payload() -> Result<(Document, PartitionKey), serde_json::Error> {
    let review = detailed_review();
    let pk = PartitionKey::Value(review.partition_key.clone());
    Ok((to_document(&review)?, pk))
}

fn task_item(id: &str, partition_key: Option<&str>, status: &str) -> Result<WritePayload, DescriptorError> {
    let item = UserTaskItem {
        id: id.to_string(),
        partition_key: partition_key.map(str::to_string),
        status: status.to_string(),
    };
    let document = to_document(&item).map_err(|e| DescriptorError::Payload(e.to_string()))?;
    Ok(WritePayload::Fixed {
        document,
        partition_key: match partition_key {
            Some(pk) => PartitionKey::value(pk),
            None => PartitionKey::None,
        },
    })
}

/// Every scenario, in menu order.
pub fn catalog() -> Result<Vec<ScenarioDefinition>, DescriptorError> {
    let v1 = reviews(REVIEWS_BY_ID);
    let v2 = reviews(REVIEWS_BY_USERNAME);
    let fixed = CollectionRef::new(FIXED_DB, FIXED_CONTAINER);
    let user_query = by_username_query();

    Ok(vec![
        ScenarioDefinition {
            key: ScenarioKey::Setup,
            title: "Setup Cosmos resources and import data",
            preparation: Preparation::FullSetup,
            shared_payload: None,
            steps: vec![],
        },
        ScenarioDefinition {
            key: ScenarioKey::Latency,
            title: "Query is taking longer than expected",
            preparation: Preparation::None,
            shared_payload: None,
            steps: vec![step(OperationDescriptor::query(v1.clone(), &user_query)?)],
        },
        ScenarioDefinition {
            key: ScenarioKey::HighRu,
            title: "Query is consuming high RU",
            preparation: Preparation::None,
            shared_payload: None,
            steps: vec![
                step(OperationDescriptor::query(v1.clone(), &user_query)?),
                step(OperationDescriptor::query(v2.clone(), &user_query)?),
            ],
        },
        ScenarioDefinition {
            key: ScenarioKey::QueryVsPointRead,
            title: "Using query instead of point reads",
            preparation: Preparation::None,
            shared_payload: None,
            steps: vec![
                step(OperationDescriptor::query(
                    v2.clone(),
                    format!("{} AND c.documentType = 'user'", user_query),
                )?),
                step(OperationDescriptor::point_read(
                    v2.clone(),
                    FEATURED_USER,
                    PartitionKey::value(FEATURED_USER),
                )?),
            ],
        },
        ScenarioDefinition {
            key: ScenarioKey::PageSize,
            title: "Tuning page size (max item count per page)",
            preparation: Preparation::None,
            shared_payload: None,
            steps: vec![
                step(
                    OperationDescriptor::query(v2.clone(), &user_query)?
                        .with_page_size(PageSize::Fixed(50))?,
                ),
                step(OperationDescriptor::query(v2.clone(), &user_query)?.with_page_size(PageSize::Auto)?),
            ],
        },
        ScenarioDefinition {
            key: ScenarioKey::CrossPartition,
            title: "Tuning cross-partition query",
            preparation: Preparation::None,
            shared_payload: None,
            steps: vec![
                step(
                    OperationDescriptor::query(v2.clone(), HIGH_RATING_QUERY)?
                        .with_page_size(PageSize::Auto)?
                        .with_concurrency(Concurrency::Auto),
                ),
                step(
                    OperationDescriptor::query(v2.clone(), HIGH_RATING_QUERY)?
                        .with_page_size(PageSize::Auto)?
                        .with_concurrency(Concurrency::Fixed(0)),
                ),
            ],
        },
        ScenarioDefinition {
            key: ScenarioKey::Streaming,
            title: "Query using Streams API for Web API scenarios",
            preparation: Preparation::None,
            shared_payload: None,
            steps: vec![
                step(OperationDescriptor::query(v2.clone(), HIGH_RATING_QUERY)?.single_page()),
                step(OperationDescriptor::query(v2, HIGH_RATING_QUERY)?.streaming()),
            ],
        },
        ScenarioDefinition {
            key: ScenarioKey::IndexingPolicy,
            title: "Tuning indexing policy",
            preparation: Preparation::None,
            shared_payload: Some(detailed_review_payload),
            steps: vec![
                titled(
                    format!("Write item to container {} with default indexing policy", DEFAULT_INDEXING),
                    OperationDescriptor::write(
                        CollectionRef::new(INDEXING_DB, DEFAULT_INDEXING),
                        WritePayload::Shared,
                        WriteMode::Create,
                    )?,
                ),
                titled(
                    format!("Write item to container {} with tuned indexing policy", TUNED_INDEXING),
                    OperationDescriptor::write(
                        CollectionRef::new(INDEXING_DB, TUNED_INDEXING),
                        WritePayload::Shared,
                        WriteMode::Create,
                    )?,
                ),
            ],
        },
        ScenarioDefinition {
            key: ScenarioKey::FixedContainer,
            title: "Scaling fixed containers with partition keys",
            preparation: Preparation::FixedContainer,
            shared_payload: None,
            steps: vec![
                best_effort(OperationDescriptor::delete(fixed.clone(), "bob", PartitionKey::None)?),
                best_effort(OperationDescriptor::delete(
                    fixed.clone(),
                    "alice",
                    PartitionKey::value("alice"),
                )?),
                titled(
                    "Add item to the fixed container without a partition key",
                    OperationDescriptor::write(
                        fixed.clone(),
                        task_item("bob", None, "Learning Azure Cosmos DB!")?,
                        WriteMode::Create,
                    )?,
                ),
                titled(
                    "Add item to the fixed container with partition key 'alice'",
                    OperationDescriptor::write(
                        fixed,
                        task_item("alice", Some("alice"), "Partitioning all the data")?,
                        WriteMode::Create,
                    )?,
                ),
            ],
        },
    ])
}

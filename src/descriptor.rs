use crate::store::{CollectionRef, Concurrency, Document, PageSize, PartitionKey, WriteMode};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("target database must not be empty")]
    EmptyDatabase,
    #[error("target container must not be empty")]
    EmptyContainer,
    #[error("query text must not be empty")]
    EmptyQuery,
    #[error("item id must not be empty")]
    EmptyId,
    #[error("page size must be positive")]
    ZeroPageSize,
    #[error("invalid payload: {0}")]
    Payload(String),
}

/// Produces a fresh document and its partition key at execution time.
pub type PayloadGenerator = fn() -> Result<(Document, PartitionKey), serde_json::Error>;

#[derive(Clone, Debug)]
pub enum WritePayload {
    Fixed {
        document: Document,
        partition_key: PartitionKey,
    },
    Generated(PayloadGenerator),
    /// Filled in once per scenario run so every step writes the same document.
    Shared,
}

#[derive(Clone, Debug)]
pub enum OperationKind {
    Query { text: String },
    PointRead { id: String, partition_key: PartitionKey },
    Write { payload: WritePayload, mode: WriteMode },
    Delete { id: String, partition_key: PartitionKey },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub page_size: PageSize,
    pub concurrency: Concurrency,
    pub streaming: bool,
    /// Stop after this many pages even when more are available.
    pub page_limit: Option<u32>,
    /// Set when any knob was chosen explicitly; reports then echo the knobs.
    pub explicit: bool,
}

/// One benchmarked data-access request. Built once, never mutated.
#[derive(Clone, Debug)]
pub struct OperationDescriptor {
    target: CollectionRef,
    kind: OperationKind,
    options: QueryOptions,
}

fn check_target(target: &CollectionRef) -> Result<(), DescriptorError> {
    if target.database.trim().is_empty() {
        return Err(DescriptorError::EmptyDatabase);
    }
    if target.container.trim().is_empty() {
        return Err(DescriptorError::EmptyContainer);
    }
    Ok(())
}

fn check_id(id: &str) -> Result<(), DescriptorError> {
    if id.trim().is_empty() {
        Err(DescriptorError::EmptyId)
    } else {
        Ok(())
    }
}

impl OperationDescriptor {
    pub fn query(target: CollectionRef, text: impl Into<String>) -> Result<Self, DescriptorError> {
        check_target(&target)?;
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DescriptorError::EmptyQuery);
        }
        Ok(Self {
            target,
            kind: OperationKind::Query { text },
            options: QueryOptions::default(),
        })
    }

    pub fn point_read(
        target: CollectionRef,
        id: impl Into<String>,
        partition_key: PartitionKey,
    ) -> Result<Self, DescriptorError> {
        check_target(&target)?;
        let id = id.into();
        check_id(&id)?;
        Ok(Self {
            target,
            kind: OperationKind::PointRead { id, partition_key },
            options: QueryOptions::default(),
        })
    }

    pub fn write(
        target: CollectionRef,
        payload: WritePayload,
        mode: WriteMode,
    ) -> Result<Self, DescriptorError> {
        check_target(&target)?;
        Ok(Self {
            target,
            kind: OperationKind::Write { payload, mode },
            options: QueryOptions::default(),
        })
    }

    pub fn delete(
        target: CollectionRef,
        id: impl Into<String>,
        partition_key: PartitionKey,
    ) -> Result<Self, DescriptorError> {
        check_target(&target)?;
        let id = id.into();
        check_id(&id)?;
        Ok(Self {
            target,
            kind: OperationKind::Delete { id, partition_key },
            options: QueryOptions::default(),
        })
    }

    pub fn with_page_size(mut self, page_size: PageSize) -> Result<Self, DescriptorError> {
        if page_size == PageSize::Fixed(0) {
            return Err(DescriptorError::ZeroPageSize);
        }
        self.options.page_size = page_size;
        self.options.explicit = true;
        Ok(self)
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.options.concurrency = concurrency;
        self.options.explicit = true;
        self
    }

    /// Read one raw page without deserializing it.
    pub fn streaming(mut self) -> Self {
        self.options.streaming = true;
        self.options.page_limit = Some(1);
        self
    }

    pub fn single_page(mut self) -> Self {
        self.options.page_limit = Some(1);
        self
    }

    /// Copy of this descriptor with a `Shared` write payload replaced by `document`.
    pub fn with_shared_payload(&self, document: &Document, partition_key: &PartitionKey) -> Self {
        let mut bound = self.clone();
        if let OperationKind::Write { payload, .. } = &mut bound.kind {
            if matches!(payload, WritePayload::Shared) {
                *payload = WritePayload::Fixed {
                    document: document.clone(),
                    partition_key: partition_key.clone(),
                };
            }
        }
        bound
    }

    pub fn target(&self) -> &CollectionRef {
        &self.target
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn is_read(&self) -> bool {
        matches!(
            self.kind,
            OperationKind::Query { .. } | OperationKind::PointRead { .. }
        )
    }

    /// Short label used in CSV output and logs.
    pub fn label(&self) -> &'static str {
        match (&self.kind, self.options.streaming) {
            (OperationKind::Query { .. }, true) => "stream-query",
            (OperationKind::Query { .. }, false) => "query",
            (OperationKind::PointRead { .. }, _) => "point-read",
            (OperationKind::Write { .. }, _) => "write",
            (OperationKind::Delete { .. }, _) => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> CollectionRef {
        CollectionRef::new("PartitioningDemo", "UserReviews_v2")
    }

    #[test]
    fn rejects_empty_parts() {
        assert_eq!(
            OperationDescriptor::query(CollectionRef::new("", "c"), "SELECT * FROM c").unwrap_err(),
            DescriptorError::EmptyDatabase
        );
        assert_eq!(
            OperationDescriptor::query(CollectionRef::new("d", " "), "SELECT * FROM c").unwrap_err(),
            DescriptorError::EmptyContainer
        );
        assert_eq!(
            OperationDescriptor::query(target(), "  ").unwrap_err(),
            DescriptorError::EmptyQuery
        );
        assert_eq!(
            OperationDescriptor::point_read(target(), "", PartitionKey::None).unwrap_err(),
            DescriptorError::EmptyId
        );
    }

    #[test]
    fn zero_page_size_is_invalid() {
        let d = OperationDescriptor::query(target(), "SELECT * FROM c").unwrap();
        assert_eq!(
            d.with_page_size(PageSize::Fixed(0)).unwrap_err(),
            DescriptorError::ZeroPageSize
        );
    }

    #[test]
    fn builders_mark_options_explicit() {
        let d = OperationDescriptor::query(target(), "SELECT * FROM c").unwrap();
        assert!(!d.options().explicit);
        let d = d.with_concurrency(Concurrency::Fixed(0));
        assert!(d.options().explicit);
        assert_eq!(d.options().concurrency, Concurrency::Fixed(0));
    }

    #[test]
    fn streaming_reads_a_single_page() {
        let d = OperationDescriptor::query(target(), "SELECT * FROM c")
            .unwrap()
            .streaming();
        assert!(d.options().streaming);
        assert_eq!(d.options().page_limit, Some(1));
        assert_eq!(d.label(), "stream-query");
    }

    #[test]
    fn shared_payload_is_bound_per_run() {
        let d = OperationDescriptor::write(target(), WritePayload::Shared, WriteMode::Create).unwrap();
        let mut doc = Document::new();
        doc.insert("id".into(), "r1".into());
        let bound = d.with_shared_payload(&doc, &PartitionKey::value("Curt28"));
        match bound.kind() {
            OperationKind::Write {
                payload: WritePayload::Fixed { document, partition_key },
                ..
            } => {
                assert_eq!(document, &doc);
                assert_eq!(partition_key, &PartitionKey::value("Curt28"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(matches!(
            d.kind(),
            OperationKind::Write { payload: WritePayload::Shared, .. }
        ));
    }
}

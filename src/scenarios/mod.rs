//! Demo scenarios: key, description, preparation and benchmarked steps.

pub mod catalog;
pub mod setup;

use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::descriptor::{OperationDescriptor, PayloadGenerator};
use crate::metrics::stats::{Stats, StatsSnapshot};
use crate::output::{self, OutputWriter, StepRow};
use crate::runner::{BenchmarkResult, RunError, run_operation};
use crate::store::DocumentStore;

pub use catalog::catalog;
pub use setup::{SetupOptions, SetupReport};

pub const PARTITIONING_DB: &str = "PartitioningDemo";
pub const REVIEWS_BY_ID: &str = "UserReviews_v1";
pub const REVIEWS_BY_USERNAME: &str = "UserReviews_v2";
pub const INDEXING_DB: &str = "IndexingDemo";
pub const DEFAULT_INDEXING: &str = "DefaultIndexingPolicy";
pub const TUNED_INDEXING: &str = "TunedIndexingPolicy";
pub const FIXED_DB: &str = "ScaleFixedContainerDemo";
pub const FIXED_CONTAINER: &str = "FixedContainer";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScenarioKey {
    Setup,
    Latency,
    HighRu,
    QueryVsPointRead,
    PageSize,
    CrossPartition,
    Streaming,
    IndexingPolicy,
    FixedContainer,
}

impl ScenarioKey {
    pub const ALL: [ScenarioKey; 9] = [
        ScenarioKey::Setup,
        ScenarioKey::Latency,
        ScenarioKey::HighRu,
        ScenarioKey::QueryVsPointRead,
        ScenarioKey::PageSize,
        ScenarioKey::CrossPartition,
        ScenarioKey::Streaming,
        ScenarioKey::IndexingPolicy,
        ScenarioKey::FixedContainer,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(n as usize).copied()
    }

    pub fn from_char(c: char) -> Option<Self> {
        c.to_digit(10).and_then(|d| Self::from_number(d as u8))
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl std::str::FromStr for ScenarioKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::from_number)
            .ok_or_else(|| format!("unknown scenario '{}', expected 0-8", s))
    }
}

/// Work done before any step runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preparation {
    None,
    /// Provision every demo resource and import the dataset.
    FullSetup,
    /// Create the legacy container used by the migration demo.
    FixedContainer,
}

#[derive(Clone, Debug)]
pub struct ScenarioStep {
    pub title: String,
    pub descriptor: OperationDescriptor,
    /// Failures are logged at debug level and never reported.
    pub best_effort: bool,
}

#[derive(Clone, Debug)]
pub struct ScenarioDefinition {
    pub key: ScenarioKey,
    pub title: &'static str,
    pub preparation: Preparation,
    /// Generated once per run and bound into every `WritePayload::Shared` step.
    pub shared_payload: Option<PayloadGenerator>,
    pub steps: Vec<ScenarioStep>,
}

impl ScenarioDefinition {
    pub fn menu_line(&self) -> String {
        format!("{} - Scenario {}: {}", self.key, self.key, self.title)
    }
}

#[derive(Debug)]
pub struct StepOutcome {
    pub title: String,
    pub result: Result<BenchmarkResult, RunError>,
    pub repeats: Option<StatsSnapshot>,
    pub best_effort: bool,
}

#[derive(Debug, Default)]
pub struct ScenarioOutcome {
    pub setup: Option<SetupReport>,
    pub steps: Vec<StepOutcome>,
}

impl ScenarioOutcome {
    /// Failed steps, not counting best-effort ones.
    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| !s.best_effort && s.result.is_err())
            .count()
    }
}

/// Owns the store handle and the catalog; runs one scenario at a time.
pub struct ScenarioRunner {
    store: Arc<dyn DocumentStore>,
    catalog: Vec<ScenarioDefinition>,
    setup: SetupOptions,
    repeat: u32,
    output: OutputWriter,
}

impl ScenarioRunner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        setup: SetupOptions,
        repeat: u32,
        output: OutputWriter,
    ) -> Result<Self> {
        Ok(Self {
            store,
            catalog: catalog()?,
            setup,
            repeat: repeat.max(1),
            output,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.store.endpoint()
    }

    pub fn catalog(&self) -> &[ScenarioDefinition] {
        &self.catalog
    }

    pub async fn run(&mut self, key: ScenarioKey) -> Result<ScenarioOutcome> {
        let def = self
            .catalog
            .iter()
            .find(|d| d.key == key)
            .ok_or_else(|| anyhow!("scenario {} is not in the catalog", key))?;
        tracing::info!(scenario = key.number(), title = def.title, "running scenario");
        let store = self.store.as_ref();
        let mut outcome = ScenarioOutcome::default();
        match def.preparation {
            Preparation::None => {}
            Preparation::FullSetup => {
                outcome.setup = Some(setup::run_setup(store, &self.setup).await?);
            }
            Preparation::FixedContainer => setup::prepare_fixed_container(store).await?,
        }
        let shared = match def.shared_payload {
            Some(generate) => Some(
                generate().map_err(|e| anyhow!("cannot build shared payload: {}", e))?,
            ),
            None => None,
        };
        for step in &def.steps {
            let descriptor = match &shared {
                Some((document, pk)) => step.descriptor.with_shared_payload(document, pk),
                None => step.descriptor.clone(),
            };
            let done = run_step(store, key, step, &descriptor, self.repeat, &mut self.output).await;
            outcome.steps.push(done);
        }
        Ok(outcome)
    }
}

async fn run_step(
    store: &dyn DocumentStore,
    key: ScenarioKey,
    step: &ScenarioStep,
    d: &OperationDescriptor,
    repeat: u32,
    out: &mut OutputWriter,
) -> StepOutcome {
    if !step.best_effort {
        output::print_heading(d, &step.title);
    }
    let result = run_operation(store, d).await;
    let row = StepRow::new(key.number(), &step.title, d);
    let mut repeats = None;
    match &result {
        Ok(r) => {
            record_row(out, &row.with_result(r)).await;
            if !step.best_effort {
                output::print_report(d, r);
            }
            if repeat > 1 && d.is_read() {
                let snap = repeat_step(store, d, r, repeat).await;
                println!("\tRepeated {} times: {}\n", repeat, snap.summary());
                repeats = Some(snap);
            }
        }
        Err(e) if step.best_effort => {
            tracing::debug!(step = %step.title, error = %e, "best-effort step failed");
        }
        Err(e) => {
            tracing::warn!(step = %step.title, error = %e, "step failed");
            record_row(out, &row.with_error(e)).await;
            let status = e
                .store_error()
                .and_then(|s| s.status)
                .map(|s| format!("{} error occurred: ", s))
                .unwrap_or_default();
            output::print_failure(&format!("{}{}", status, e));
        }
    }
    StepOutcome {
        title: step.title.clone(),
        result,
        repeats,
        best_effort: step.best_effort,
    }
}

/// A CSV failure is logged; the scenario keeps going.
async fn record_row(out: &mut OutputWriter, row: &StepRow) {
    if let Err(e) = out.write_row(row).await {
        tracing::warn!(step = %row.step, error = %e, "cannot write csv row");
    }
}

async fn repeat_step(
    store: &dyn DocumentStore,
    d: &OperationDescriptor,
    first: &BenchmarkResult,
    repeat: u32,
) -> StatsSnapshot {
    let mut stats = Stats::new();
    stats.record(first);
    for _ in 1..repeat {
        match run_operation(store, d).await {
            Ok(r) => stats.record(&r),
            Err(e) => {
                tracing::debug!(error = %e, "repeated run failed");
                stats.record_error();
            }
        }
    }
    stats.snapshot()
}

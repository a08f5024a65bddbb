use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::descriptor::{OperationDescriptor, OperationKind, WritePayload};
use crate::runner::BenchmarkResult;
use crate::store::WriteMode;

/// `HH:MM:SS.ff`, hundredths truncated.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:02}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        d.subsec_millis() / 10
    )
}

fn format_cost(cost: f64) -> String {
    let s = format!("{:.2}", cost);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

/// Knob lines printed under a query heading when the knobs were set explicitly.
pub fn option_lines(descriptor: &OperationDescriptor) -> Vec<String> {
    let opts = descriptor.options();
    if !opts.explicit || !matches!(descriptor.kind(), OperationKind::Query { .. }) {
        return Vec::new();
    }
    vec![
        format!("Using concurrency: {}", opts.concurrency),
        format!("Using page size: {}", opts.page_size),
    ]
}

/// Plain result lines for one run.
pub fn report_lines(descriptor: &OperationDescriptor, result: &BenchmarkResult) -> Vec<String> {
    let mut lines = Vec::new();
    match descriptor.kind() {
        OperationKind::Query { .. } if descriptor.options().streaming => {
            lines.push("\tReturned single page of query results as stream:".to_string());
            if let Some(excerpt) = &result.body_excerpt {
                lines.push(format!("\t{}...", excerpt));
            }
        }
        OperationKind::Query { .. } => {
            if descriptor.options().explicit {
                let mut seen = 0usize;
                for n in &result.page_item_counts {
                    seen += *n;
                    lines.push(format!("\tResult count: {}", seen));
                }
            }
            lines.push(format!("\tQuery returned {} results", result.result_count));
        }
        OperationKind::PointRead { .. } => {
            lines.push(format!("\tPoint read returned {} results", result.result_count));
        }
        OperationKind::Write { payload, mode } => {
            let id = result
                .item
                .as_ref()
                .and_then(|d| d.get("id"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let pk = match payload {
                WritePayload::Fixed { partition_key, .. } => partition_key.to_string(),
                WritePayload::Generated(_) => "generated".to_string(),
                WritePayload::Shared => "shared".to_string(),
            };
            let verb = match mode {
                WriteMode::Create => "Created",
                WriteMode::Upsert => "Upserted",
            };
            lines.push(format!(
                "\t{} item with id: {} and partitionKey: {}",
                verb, id, pk
            ));
        }
        OperationKind::Delete { id, partition_key } => {
            lines.push(format!(
                "\tDeleted item with id: {} and partitionKey: {}",
                id, partition_key
            ));
        }
    }
    lines.push(format!("\tTotal time: {}", format_elapsed(result.elapsed)));
    lines.push(format!(
        "\tTotal Request Units consumed: {}",
        format_cost(result.cost_units)
    ));
    lines
}

pub fn print_banner(text: &str) {
    println!("{}", text.yellow().on_blue());
}

pub fn print_heading(descriptor: &OperationDescriptor, title: &str) {
    println!("{}", title.yellow().on_blue());
    for line in option_lines(descriptor) {
        println!("{}", line.yellow().on_blue());
    }
    println!();
}

pub fn print_report(descriptor: &OperationDescriptor, result: &BenchmarkResult) {
    for line in report_lines(descriptor, result) {
        if line.ends_with("...") {
            println!("{}", line.white());
        } else {
            println!("{}", line.green());
        }
    }
    println!("\n");
}

pub fn print_failure(message: &str) {
    println!("{}", format!("\t{}", message).red());
    println!("\n");
}

/// One CSV row per executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRow {
    pub timestamp: String,
    pub scenario: u8,
    pub step: String,
    pub operation: String,
    pub collection: String,
    pub page_size: String,
    pub concurrency: String,
    pub result_count: usize,
    pub pages: usize,
    pub elapsed_ms: f64,
    pub cost_units: f64,
    pub error: String,
}

impl StepRow {
    pub fn new(scenario: u8, step: &str, descriptor: &OperationDescriptor) -> Self {
        let opts = descriptor.options();
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            scenario,
            step: step.to_string(),
            operation: descriptor.label().to_string(),
            collection: descriptor.target().to_string(),
            page_size: opts.page_size.to_string(),
            concurrency: opts.concurrency.to_string(),
            result_count: 0,
            pages: 0,
            elapsed_ms: 0.0,
            cost_units: 0.0,
            error: String::new(),
        }
    }

    pub fn with_result(mut self, result: &BenchmarkResult) -> Self {
        self.result_count = result.result_count;
        self.pages = result.pages;
        self.elapsed_ms = result.elapsed.as_secs_f64() * 1000.0;
        self.cost_units = result.cost_units;
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = error.to_string();
        self
    }

    pub fn csv_header() -> &'static str {
        "timestamp,scenario,step,operation,collection,page_size,concurrency,result_count,pages,elapsed_ms,cost_units,error"
    }

    pub fn to_csv_row(&self) -> Result<String> {
        let mut w = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        w.serialize(self)?;
        let bytes = w.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;
        Ok(String::from_utf8(bytes)?.trim_end().to_string())
    }
}

pub enum OutputWriter {
    Csv(BufWriter<File>),
    Disabled,
}

impl OutputWriter {
    pub async fn new_csv(path: String) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.ok();
            }
        }
        let file = File::create(&path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(StepRow::csv_header().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        tracing::info!(path = %path, "writing step results as CSV");
        Ok(Self::Csv(writer))
    }

    pub fn disabled() -> Self {
        Self::Disabled
    }

    pub async fn write_row(&mut self, row: &StepRow) -> Result<()> {
        if let Self::Csv(writer) = self {
            writer.write_all(row.to_csv_row()?.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CollectionRef, Concurrency, PageSize};

    fn result(count: usize, ms: u64, cost: f64) -> BenchmarkResult {
        BenchmarkResult {
            operation: "query",
            result_count: count,
            elapsed: Duration::from_millis(ms),
            cost_units: cost,
            pages: 1,
            page_item_counts: vec![count],
            continuation: None,
            body_excerpt: None,
            item: None,
        }
    }

    #[test]
    fn elapsed_uses_hundredths() {
        assert_eq!(format_elapsed(Duration::from_millis(1234)), "00:00:01.23");
        assert_eq!(format_elapsed(Duration::from_millis(3_723_459)), "01:02:03.45");
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00.00");
    }

    #[test]
    fn query_report_lines() {
        let d = OperationDescriptor::query(CollectionRef::new("db", "c"), "SELECT * FROM c").unwrap();
        let lines = report_lines(&d, &result(12, 40, 2.9));
        assert_eq!(
            lines,
            vec![
                "\tQuery returned 12 results".to_string(),
                "\tTotal time: 00:00:00.04".to_string(),
                "\tTotal Request Units consumed: 2.9".to_string(),
            ]
        );
        assert!(option_lines(&d).is_empty());
    }

    #[test]
    fn explicit_knobs_are_echoed() {
        let d = OperationDescriptor::query(CollectionRef::new("db", "c"), "SELECT * FROM c")
            .unwrap()
            .with_page_size(PageSize::Fixed(50))
            .unwrap()
            .with_concurrency(Concurrency::Fixed(0));
        assert_eq!(
            option_lines(&d),
            vec!["Using concurrency: 0".to_string(), "Using page size: 50".to_string()]
        );
    }

    #[test]
    fn explicit_queries_report_running_page_totals() {
        let d = OperationDescriptor::query(CollectionRef::new("db", "c"), "SELECT * FROM c")
            .unwrap()
            .with_page_size(PageSize::Fixed(5))
            .unwrap();
        let mut r = result(12, 40, 2.9);
        r.pages = 3;
        r.page_item_counts = vec![5, 5, 2];
        let lines = report_lines(&d, &r);
        assert_eq!(
            &lines[..4],
            &[
                "\tResult count: 5".to_string(),
                "\tResult count: 10".to_string(),
                "\tResult count: 12".to_string(),
                "\tQuery returned 12 results".to_string(),
            ]
        );
    }

    #[test]
    fn csv_rows_quote_embedded_commas() {
        let d = OperationDescriptor::query(CollectionRef::new("db", "c"), "SELECT * FROM c").unwrap();
        let row = StepRow::new(4, "page size 50, then auto", &d).with_result(&result(3, 5, 1.5));
        let line = row.to_csv_row().unwrap();
        assert!(line.contains(",4,\"page size 50, then auto\",query,db/c,auto,auto,3,1,5.0,1.5,"));
        assert_eq!(
            line.split(',').count(),
            StepRow::csv_header().split(',').count() + 1
        );
    }

    #[tokio::test]
    async fn csv_writer_emits_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("steps.csv");
        let mut out = OutputWriter::new_csv(path.to_string_lossy().into_owned())
            .await
            .unwrap();
        let d = OperationDescriptor::query(CollectionRef::new("db", "c"), "SELECT * FROM c").unwrap();
        out.write_row(&StepRow::new(1, "latency", &d).with_error("boom"))
            .await
            .unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        let mut lines = body.lines();
        assert_eq!(lines.next(), Some(StepRow::csv_header()));
        assert!(lines.next().unwrap().ends_with(",boom"));
    }
}

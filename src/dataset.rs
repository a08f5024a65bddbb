//! Demo data: downloaded, read from disk, or generated from a seed.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use crate::records::{DemoRecord, ProductReview, ProductReviewDetailed, User};

pub const DEFAULT_DATASET_URL: &str =
    "https://cosmosnotebooksdata.blob.core.windows.net/notebookdata/ProductReviewsData.json";

/// The user every scenario queries for.
pub const FEATURED_USER: &str = "Curt28";

#[derive(Clone, Debug)]
pub enum DatasetSource {
    Url(String),
    File(PathBuf),
    Synthetic { users: usize, seed: u64 },
}

impl std::fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetSource::Url(u) => write!(f, "'{}'", u),
            DatasetSource::File(p) => write!(f, "'{}'", p.display()),
            DatasetSource::Synthetic { users, seed } => {
                write!(f, "synthetic generator ({} users, seed {})", users, seed)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Dataset {
    pub records: Vec<DemoRecord>,
    /// Entries with an unknown `documentType` or missing fields.
    pub skipped: usize,
}

pub async fn load(source: &DatasetSource) -> Result<Dataset> {
    match source {
        DatasetSource::Url(url) => {
            let body = reqwest::get(url)
                .await
                .with_context(|| format!("downloading {}", url))?
                .error_for_status()?
                .text()
                .await?;
            parse(&body)
        }
        DatasetSource::File(path) => {
            let body = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            parse(&body)
        }
        DatasetSource::Synthetic { users, seed } => Ok(Dataset {
            records: synthetic(*users, *seed),
            skipped: 0,
        }),
    }
}

/// Parses a JSON array of mixed user and review documents.
pub fn parse(body: &str) -> Result<Dataset> {
    let values: Vec<Value> = serde_json::from_str(body).context("dataset is not a JSON array")?;
    let mut out = Dataset::default();
    for v in values {
        match serde_json::from_value::<DemoRecord>(v) {
            Ok(r) => out.records.push(r),
            Err(e) => {
                tracing::debug!(error = %e, "skipping dataset entry");
                out.skipped += 1;
            }
        }
    }
    Ok(out)
}

const FIRST_NAMES: &[&str] = &[
    "Curt", "Ada", "Lena", "Marco", "Priya", "Tomas", "Yuki", "Noor", "Ivan", "Sofia", "Omar",
    "Grace", "Kofi", "Mei", "Lars",
];
const LAST_NAMES: &[&str] = &[
    "Hansen", "Okafor", "Silva", "Nakamura", "Novak", "Reyes", "Schmidt", "Khan", "Dubois",
    "Larsen",
];
const COUNTRIES: &[&str] = &["United States", "Canada", "Germany", "Japan", "Brazil", "India"];
const TIERS: &[&str] = &["bronze", "silver", "gold", "platinum"];
const PRODUCTS: &[&str] = &[
    "Winter Jacket", "Trail Shoes", "Espresso Maker", "Desk Lamp", "Backpack", "Headphones",
    "Water Bottle", "Yoga Mat", "Keyboard", "Rain Boots",
];
const ADJECTIVES: &[&str] = &[
    "Ergonomic", "Rustic", "Sleek", "Handcrafted", "Refined", "Practical", "Gorgeous", "Sturdy",
];
const SENTENCES: &[&str] = &[
    "Exactly what I was looking for.",
    "Arrived late but works as described.",
    "Would buy again without hesitation.",
    "The quality is not what I expected.",
    "Great value for the price.",
    "Stopped working after two weeks.",
    "My whole family loves it.",
];

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn rating(rng: &mut StdRng) -> f64 {
    (rng.gen_range(0.0..5.0_f64) * 10.0).round() / 10.0
}

/// Deterministic users and reviews; the featured user always has reviews.
pub fn synthetic(users: usize, seed: u64) -> Vec<DemoRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    for i in 0..users.max(1) {
        let (first, username) = if i == 0 {
            ("Curt".to_string(), FEATURED_USER.to_string())
        } else {
            let first = pick(&mut rng, FIRST_NAMES).to_string();
            let username = format!("{}{}", first, 100 + i);
            (first, username)
        };
        let since = Utc::now() - ChronoDuration::days(rng.gen_range(30..3000));
        out.push(DemoRecord::User(User {
            id: username.clone(),
            username: username.clone(),
            first_name: first.clone(),
            last_name: pick(&mut rng, LAST_NAMES).to_string(),
            country: pick(&mut rng, COUNTRIES).to_string(),
            phone_number: format!("555-{:04}", rng.gen_range(0..10_000)),
            loyalty_tier: pick(&mut rng, TIERS).to_string(),
            email_address: format!("{}@example.com", username.to_lowercase()),
            member_since: since.to_rfc3339(),
            member_since_year: since.format("%Y").to_string(),
        }));
        let reviews = if i == 0 { 12 } else { rng.gen_range(0..6) };
        for _ in 0..reviews {
            out.push(DemoRecord::Review(ProductReview {
                id: uuid::Uuid::new_v4().to_string(),
                username: username.clone(),
                verified_purchase: rng.gen_bool(0.7),
                product: pick(&mut rng, PRODUCTS).to_string(),
                review: pick(&mut rng, SENTENCES).to_string(),
                rating: rating(&mut rng),
                review_date: (Utc::now() - ChronoDuration::days(rng.gen_range(0..1000)))
                    .to_rfc3339(),
            }));
        }
    }
    out
}

/// A fresh review with twelve padding properties.
pub fn detailed_review() -> ProductReviewDetailed {
    let mut rng = StdRng::from_entropy();
    let username = format!("{}{}", pick(&mut rng, FIRST_NAMES), rng.gen_range(10..100));
    let adjective = |rng: &mut StdRng| pick(rng, ADJECTIVES).to_string();
    let sentence = |rng: &mut StdRng| pick(rng, SENTENCES).to_string();
    ProductReviewDetailed {
        id: uuid::Uuid::new_v4().to_string(),
        partition_key: username.clone(),
        username,
        verified_purchase: rng.gen_bool(0.5),
        product: pick(&mut rng, PRODUCTS).to_string(),
        review: sentence(&mut rng),
        rating: rating(&mut rng),
        review_date: Utc::now() - ChronoDuration::days(rng.gen_range(0..1000)),
        document_type: "review".into(),
        prop1: adjective(&mut rng),
        prop2: sentence(&mut rng),
        prop3: sentence(&mut rng),
        prop4: sentence(&mut rng),
        prop5: adjective(&mut rng),
        prop6: adjective(&mut rng),
        prop7: adjective(&mut rng),
        prop8: adjective(&mut rng),
        prop9: adjective(&mut rng),
        prop10: adjective(&mut rng),
        prop11: adjective(&mut rng),
        prop12: adjective(&mut rng),
    }
}

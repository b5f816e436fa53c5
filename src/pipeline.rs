use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use crate::collector;
use crate::config::{RetryPolicy, Settings};
use crate::db;
use crate::extractor;
use crate::fetch::PageSource;
use crate::handoff;
use crate::models::{ProductLink, ProductRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Collect,
    Extract,
    Load,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Collect => "collect",
            Stage::Extract => "extract",
            Stage::Load => "load",
        })
    }
}

/// Run `body` until it succeeds or the retries run out. Every attempt starts
/// the stage over; nothing from a failed attempt is kept.
pub async fn run_stage<T, F, Fut>(stage: Stage, policy: RetryPolicy, mut body: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.retries.saturating_add(1);
    for attempt in 1..=attempts {
        info!("Stage {} running (attempt {}/{})", stage, attempt, attempts);
        match body().await {
            Ok(value) => {
                info!("Stage {} succeeded", stage);
                return Ok(value);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "Stage {} failed: {:#}; retrying in {:.1}s",
                    stage,
                    e,
                    policy.delay.as_secs_f64()
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                error!("Stage {} failed after {} attempts: {:#}", stage, attempts, e);
                return Err(e.context(format!("stage {} failed", stage)));
            }
        }
    }
    unreachable!("at least one attempt is always made")
}

pub async fn collect<S, F>(settings: &Settings, new_source: &F) -> Result<Vec<ProductLink>>
where
    S: PageSource,
    F: Fn() -> Result<S>,
{
    run_stage(Stage::Collect, settings.retry, || async move {
        let source = new_source()?;
        collector::collect_links(&source, &settings.category_url).await
    })
    .await
}

pub async fn extract<S, F>(
    settings: &Settings,
    new_source: &F,
    links: &[ProductLink],
) -> Result<Vec<ProductRecord>>
where
    S: PageSource,
    F: Fn() -> Result<S>,
{
    run_stage(Stage::Extract, settings.retry, || async move {
        let source = new_source()?;
        extractor::extract_all(&source, links).await
    })
    .await
}

/// Extract records for the links saved in `input` and overwrite `output`
/// with them. An empty links file still writes an empty records file, so a
/// later load never picks up records from an earlier run.
pub async fn extract_file<S, F>(
    settings: &Settings,
    new_source: &F,
    input: &Path,
    output: &Path,
) -> Result<usize>
where
    S: PageSource,
    F: Fn() -> Result<S>,
{
    let links: Vec<ProductLink> = handoff::read_json(input)?;
    if links.is_empty() {
        warn!("No links in {:?}; writing an empty record set", input);
    }
    let records = extract(settings, new_source, &links).await?;
    handoff::write_json(output, &records)?;
    Ok(records.len())
}

pub async fn load(settings: &Settings, records: &[ProductRecord]) -> Result<usize> {
    run_stage(Stage::Load, settings.retry, || async move {
        let writer = db::open_writer(&settings.destination).await?;
        let rows = writer.replace_products(&settings.table, records).await?;
        info!("Replaced table {} with {} rows", settings.table, rows);
        Ok(rows)
    })
    .await
}

pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub links: usize,
    pub records: usize,
    pub rows: usize,
    pub elapsed: Duration,
}

/// One full run: collect, then extract, then load. Each stage builds its own
/// page source and drops it when done.
pub async fn run_once<S, F>(settings: &Settings, new_source: F) -> Result<RunReport>
where
    S: PageSource,
    F: Fn() -> Result<S>,
{
    let started_at = Local::now();
    let t0 = Instant::now();
    info!("Run started at {}", started_at.format("%Y-%m-%d %H:%M:%S"));

    let links = collect(settings, &new_source).await?;
    let records = extract(settings, &new_source, &links).await?;
    let rows = load(settings, &records).await?;

    Ok(RunReport {
        started_at,
        links: links.len(),
        records: records.len(),
        rows,
        elapsed: t0.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use reqwest::Url;

    use super::*;
    use crate::collector::page_url;
    use crate::config::{ConfigError, DbConfig, Destination};
    use crate::db::testing::temp_db;
    use crate::db::SqliteWriter;
    use crate::fetch::testing::{detail, listing, MemorySource};

    const CATEGORY: &str = "https://shop.test/catalog/mice/";

    fn no_wait(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::ZERO,
        }
    }

    fn settings(destination: Destination, retries: u32) -> Settings {
        Settings {
            category_url: CATEGORY.to_string(),
            table: "test_DNS".to_string(),
            destination,
            retry: no_wait(retries),
        }
    }

    /// Two listing pages with 3 and 2 products, plus their detail pages.
    fn shop(codes: [i64; 5]) -> MemorySource {
        let category = Url::parse(CATEGORY).unwrap();
        let hrefs: Vec<String> = codes.iter().map(|c| format!("/product/{}/", c)).collect();
        let refs: Vec<&str> = hrefs.iter().map(String::as_str).collect();

        let mut pages = vec![
            (CATEGORY.to_string(), listing(5, &refs[..3])),
            (page_url(&category, 1).to_string(), listing(5, &refs[..3])),
            (page_url(&category, 2).to_string(), listing(5, &refs[3..])),
        ];
        for code in codes {
            pages.push((
                format!("https://shop.test/product/{}/", code),
                detail(&format!("Mouse {}", code), code, "1 299 ₽", "Китай"),
            ));
        }
        MemorySource::new(pages)
    }

    #[tokio::test]
    async fn two_pages_end_to_end() {
        let path = temp_db("e2e");
        let settings = settings(Destination::Sqlite(path.clone()), 0);
        let source = shop([1, 2, 3, 4, 5]);
        let built = Cell::new(0);

        let report = run_once(&settings, || {
            built.set(built.get() + 1);
            Ok(source.clone())
        })
        .await
        .unwrap();

        assert_eq!(report.links, 5);
        assert_eq!(report.records, 5);
        assert_eq!(report.rows, 5);
        assert_eq!(SqliteWriter::new(&path).row_count("test_DNS").unwrap(), 5);
        // one source for the collector, one for the extractor
        assert_eq!(built.get(), 2);
        // listing + 2 pages + 5 details
        assert_eq!(source.hits(), 8);
    }

    #[tokio::test]
    async fn second_run_replaces_first() {
        let path = temp_db("rerun");
        let settings = settings(Destination::Sqlite(path.clone()), 0);

        run_once(&settings, || Ok(shop([1, 2, 3, 4, 5]))).await.unwrap();
        let report = run_once(&settings, || Ok(shop([6, 7, 8, 9, 10]))).await.unwrap();
        assert_eq!(report.rows, 5);

        let conn = db::connect(&path).unwrap();
        let min: i64 = conn
            .query_row("SELECT MIN(code) FROM \"test_DNS\"", [], |r| r.get(0))
            .unwrap();
        assert_eq!(min, 6);
        assert_eq!(SqliteWriter::new(&path).row_count("test_DNS").unwrap(), 5);
    }

    #[tokio::test]
    async fn empty_links_file_clears_stale_records() {
        let dir = std::env::temp_dir().join(format!(
            "dns_mice_extract_file_{}",
            std::process::id()
        ));
        let links_path = dir.join("links.json");
        let records_path = dir.join("records.json");
        handoff::write_json(&links_path, &Vec::<ProductLink>::new()).unwrap();
        let stale = vec![ProductRecord {
            name: "Old mouse".into(),
            code: 1,
            price: 990.0,
            country: "Китай".into(),
        }];
        handoff::write_json(&records_path, &stale).unwrap();

        let path = temp_db("empty_links");
        let settings = settings(Destination::Sqlite(path.clone()), 0);
        let source = MemorySource::default();
        let new_source = || -> Result<MemorySource> { Ok(source.clone()) };
        let written = extract_file(&settings, &new_source, &links_path, &records_path)
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(source.hits(), 0);
        let records: Vec<ProductRecord> = handoff::read_json(&records_path).unwrap();
        assert!(records.is_empty());

        let rows = load(&settings, &records).await.unwrap();
        assert_eq!(rows, 0);
        assert_eq!(SqliteWriter::new(&path).row_count("test_DNS").unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_credentials_fail_at_load() {
        let cfg = DbConfig {
            username: None,
            password: None,
            database: None,
            hostname: "127.0.0.1".into(),
            port: 5432,
        };
        let settings = settings(Destination::Postgres(cfg), 0);
        let source = shop([1, 2, 3, 4, 5]);

        let err = run_once(&settings, || Ok(source.clone())).await.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingCredential(_))
        ));
        assert!(format!("{:#}", err).contains("stage load failed"));
        // collector and extractor both ran to completion first
        assert_eq!(source.hits(), 8);
    }

    #[tokio::test]
    async fn retry_reruns_whole_stage() {
        let calls = Cell::new(0);
        let value = run_stage(Stage::Extract, no_wait(3), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    anyhow::bail!("transient {}", n)
                }
                Ok(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let calls = Cell::new(0);
        let err = run_stage(Stage::Collect, no_wait(3), || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(anyhow::anyhow!("page layout changed")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.get(), 4);
        let msg = format!("{:#}", err);
        assert!(msg.contains("stage collect failed"));
        assert!(msg.contains("page layout changed"));
    }

    #[tokio::test]
    async fn collector_failure_retries_from_scratch() {
        let source = shop([1, 2, 3, 4, 5]);
        let broken = MemorySource::new([(CATEGORY, "<html></html>")]);
        let attempt = Cell::new(0);
        let settings = settings(Destination::Sqlite(temp_db("retry")), 1);

        let new_source = || -> Result<MemorySource> {
            attempt.set(attempt.get() + 1);
            Ok(if attempt.get() == 1 {
                broken.clone()
            } else {
                source.clone()
            })
        };
        let links = collect(&settings, &new_source).await.unwrap();

        assert_eq!(links.len(), 5);
        assert_eq!(broken.hits(), 1);
        // the second attempt walked the listing again from the first page
        assert_eq!(source.hits(), 3);
    }
}

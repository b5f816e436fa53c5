use std::sync::LazyLock;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use thiserror::Error;
use tracing::info;

use crate::fetch::PageSource;
use crate::models::{ProductLink, ProductRecord};
use crate::page::Page;

const NAME_SELECTOR: &str = ".product-card-top__name";
const CODE_SELECTOR: &str = ".product-card-top__code";
const PRICE_SELECTOR: &str = ".product-buy__price";
const SPEC_ROW_SELECTOR: &str = ".product-characteristics__spec";
const SPEC_TITLE_SELECTOR: &str = ".product-characteristics__spec-title";
const SPEC_VALUE_SELECTOR: &str = ".product-characteristics__spec-value";
const COUNTRY_TITLE: &str = "Страна производства";

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d\s]*(?:[.,]\d+)?").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("cannot read {field} from {text:?}")]
    BadNumber { field: &'static str, text: String },
}

/// "Код товара: 1078253" → 1078253
fn parse_code(text: &str) -> Result<i64, ExtractError> {
    text.split_whitespace()
        .nth(2)
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| ExtractError::BadNumber {
            field: "code",
            text: text.to_string(),
        })
}

/// "1 299 ₽" → 1299.0, "849,50 ₽" → 849.5
fn parse_price(text: &str) -> Result<f64, ExtractError> {
    PRICE_RE
        .find(text)
        .map(|m| {
            m.as_str()
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| if c == ',' { '.' } else { c })
                .collect::<String>()
        })
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ExtractError::BadNumber {
            field: "price",
            text: text.to_string(),
        })
}

fn country(page: &Page) -> Result<String> {
    let specs = page.key_values(SPEC_ROW_SELECTOR, SPEC_TITLE_SELECTOR, SPEC_VALUE_SELECTOR)?;
    match specs.into_iter().find(|(k, _)| k.contains(COUNTRY_TITLE)) {
        Some((_, v)) => Ok(v),
        None => Ok(page.text(SPEC_VALUE_SELECTOR)?),
    }
}

/// Build one record from a rendered detail page.
pub fn extract_record(html: &str) -> Result<ProductRecord> {
    let page = Page::parse(html);
    Ok(ProductRecord {
        name: page.text(NAME_SELECTOR)?,
        code: parse_code(&page.text(CODE_SELECTOR)?)?,
        price: parse_price(&page.text(PRICE_SELECTOR)?)?,
        country: country(&page)?,
    })
}

/// Visit every link in order; one record per link. The first failure
/// aborts the batch.
pub async fn extract_all(
    source: &dyn PageSource,
    links: &[ProductLink],
) -> Result<Vec<ProductRecord>> {
    let pb = ProgressBar::new(links.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut records = Vec::with_capacity(links.len());
    for link in links {
        let html = source.fetch(link.as_str()).await?;
        let record =
            extract_record(&html).with_context(|| format!("Failed to extract {}", link))?;
        records.push(record);
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Extracted {} product records", records.len());
    Ok(records)
}

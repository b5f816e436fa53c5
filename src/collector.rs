use anyhow::{Context, Result};
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, info};

use crate::fetch::PageSource;
use crate::models::ProductLink;
use crate::page::Page;

const COUNT_SELECTOR: &str = ".products-count";
const CARD_SELECTOR: &str = "div.catalog-product";
const LINK_SELECTOR: &str = "div.catalog-product a.catalog-product__name";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectError {
    #[error("listing page shows no product cards")]
    EmptyListing,
    #[error("cannot read product count from {0:?}")]
    BadCount(String),
}

/// Number of listing pages needed for `total` products at `per_page` a page.
pub fn page_count(total: usize, per_page: usize) -> Result<usize, CollectError> {
    if per_page == 0 {
        return Err(CollectError::EmptyListing);
    }
    Ok(total.div_ceil(per_page))
}

/// "95 товаров" → 95
fn parse_total(text: &str) -> Result<usize, CollectError> {
    text.split_whitespace()
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| CollectError::BadCount(text.to_string()))
}

/// Total product count and cards on the first page.
fn listing_bounds(html: &str) -> Result<(usize, usize)> {
    let page = Page::parse(html);
    let total = parse_total(&page.text(COUNT_SELECTOR)?)?;
    let per_page = page.count(CARD_SELECTOR)?;
    Ok((total, per_page))
}

/// URL of the 1-based listing page `index`.
pub fn page_url(category: &Url, index: usize) -> Url {
    let mut url = category.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair("p", &index.to_string());
    url
}

fn page_links(html: &str, base: &Url) -> Result<Vec<ProductLink>> {
    Page::parse(html)
        .attrs(LINK_SELECTOR, "href")?
        .iter()
        .map(|href| {
            base.join(href)
                .map(|u| ProductLink(u.to_string()))
                .with_context(|| format!("Bad product href {:?}", href))
        })
        .collect()
}

/// Walk every page of the category listing and return product links in page
/// order, then DOM order. Duplicates across pages are kept.
pub async fn collect_links(source: &dyn PageSource, category_url: &str) -> Result<Vec<ProductLink>> {
    let category = Url::parse(category_url)
        .with_context(|| format!("Invalid category URL {}", category_url))?;

    info!("Reading listing bounds from {}", category);
    let html = source.fetch(category.as_str()).await?;
    let (total, per_page) = listing_bounds(&html).context("Failed to read listing bounds")?;
    let pages = page_count(total, per_page)?;
    info!(
        "{} products, {} per page -> {} pages",
        total, per_page, pages
    );

    let mut links = Vec::new();
    // the site numbers listing pages from 1; ?p=0 serves the first page again
    for index in 1..=pages {
        let url = page_url(&category, index);
        let html = source.fetch(url.as_str()).await?;
        let found = page_links(&html, &url)
            .with_context(|| format!("Failed to read product links on {}", url))?;
        debug!("Page {}/{}: {} links", index, pages, found.len());
        links.extend(found);
    }

    info!("Collected {} product links", links.len());
    Ok(links)
}

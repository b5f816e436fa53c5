use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("invalid selector '{selector}': {error}")]
    InvalidSelector { selector: String, error: String },
    #[error("no element matches '{0}'")]
    MissingElement(String),
    #[error("element '{selector}' has no '{attr}' attribute")]
    MissingAttribute { selector: String, attr: String },
}

/// A parsed HTML document queried by CSS selector.
pub struct Page {
    doc: Html,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        Self {
            doc: Html::parse_document(html),
        }
    }

    /// Whitespace-normalised text of the first match.
    pub fn text(&self, css: &str) -> Result<String, PageError> {
        let selector = selector(css)?;
        self.doc
            .select(&selector)
            .next()
            .map(element_text)
            .ok_or_else(|| PageError::MissingElement(css.to_string()))
    }

    pub fn count(&self, css: &str) -> Result<usize, PageError> {
        let selector = selector(css)?;
        Ok(self.doc.select(&selector).count())
    }

    /// `attr` of every match, in document order. A match without the
    /// attribute is an error.
    pub fn attrs(&self, css: &str, attr: &str) -> Result<Vec<String>, PageError> {
        let selector = selector(css)?;
        self.doc
            .select(&selector)
            .map(|el| {
                el.value()
                    .attr(attr)
                    .map(str::to_string)
                    .ok_or_else(|| PageError::MissingAttribute {
                        selector: css.to_string(),
                        attr: attr.to_string(),
                    })
            })
            .collect()
    }

    /// For every `row` match, the text of its first `key` and `value`
    /// descendants. Rows lacking either are skipped.
    pub fn key_values(
        &self,
        row: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<(String, String)>, PageError> {
        let row_sel = selector(row)?;
        let key_sel = selector(key)?;
        let value_sel = selector(value)?;
        Ok(self
            .doc
            .select(&row_sel)
            .filter_map(|r| {
                let k = r.select(&key_sel).next().map(element_text)?;
                let v = r.select(&value_sel).next().map(element_text)?;
                Some((k, v))
            })
            .collect())
    }
}

fn selector(css: &str) -> Result<Selector, PageError> {
    Selector::parse(css).map_err(|e| PageError::InvalidSelector {
        selector: css.to_string(),
        error: format!("{:?}", e),
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

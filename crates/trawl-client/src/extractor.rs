//! CSS-selector listing extractor.
//!
//! Each source registers the selectors for its listing page: one matching
//! every item row, and the title, link, price and posted-at parts relative to
//! that row. Relative links are resolved against the source URL.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use trawl_core::error::AppError;
use trawl_core::models::{Record, SourceDescriptor};
use trawl_core::traits::Extractor;
use url::Url;

/// Selector strings for one source's listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSelectors {
    pub item: String,
    pub title: String,
    /// Element carrying the `href`. Falls back to the title element.
    pub link: Option<String>,
    pub price: Option<String>,
    pub posted_at: Option<String>,
}

impl ListingSelectors {
    pub fn new(item: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            title: title.into(),
            link: None,
            price: None,
            posted_at: None,
        }
    }

    pub fn with_link(mut self, selector: impl Into<String>) -> Self {
        self.link = Some(selector.into());
        self
    }

    pub fn with_price(mut self, selector: impl Into<String>) -> Self {
        self.price = Some(selector.into());
        self
    }

    pub fn with_posted_at(mut self, selector: impl Into<String>) -> Self {
        self.posted_at = Some(selector.into());
        self
    }
}

#[derive(Clone)]
struct CompiledSelectors {
    item: Selector,
    title: Selector,
    link: Option<Selector>,
    price: Option<Selector>,
    posted_at: Option<Selector>,
}

impl CompiledSelectors {
    fn compile(selectors: &ListingSelectors) -> Result<Self, AppError> {
        Ok(Self {
            item: parse_selector(&selectors.item)?,
            title: parse_selector(&selectors.title)?,
            link: selectors.link.as_deref().map(parse_selector).transpose()?,
            price: selectors.price.as_deref().map(parse_selector).transpose()?,
            posted_at: selectors
                .posted_at
                .as_deref()
                .map(parse_selector)
                .transpose()?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector)
        .map_err(|e| AppError::ConfigError(format!("Invalid selector '{selector}': {e}")))
}

#[derive(Clone, Default)]
pub struct SelectorExtractor {
    sources: Arc<HashMap<String, CompiledSelectors>>,
}

impl SelectorExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the selectors for `source_id`, compiling them up front.
    pub fn with_source(
        mut self,
        source_id: impl Into<String>,
        selectors: &ListingSelectors,
    ) -> Result<Self, AppError> {
        let compiled = CompiledSelectors::compile(selectors)?;
        Arc::make_mut(&mut self.sources).insert(source_id.into(), compiled);
        Ok(self)
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, source: &SourceDescriptor, html: &str) -> Result<Vec<Record>, AppError> {
        let selectors = self.sources.get(&source.id).ok_or_else(|| {
            AppError::ExtractError(format!("No selectors registered for '{}'", source.id))
        })?;
        let base = Url::parse(&source.url)
            .map_err(|e| AppError::ExtractError(format!("Invalid source URL: {e}")))?;

        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for item in document.select(&selectors.item) {
            let Some(title_el) = item.select(&selectors.title).next() else {
                continue;
            };
            let title = element_text(&title_el);
            if title.is_empty() {
                continue;
            }

            let link_el = match &selectors.link {
                Some(selector) => item.select(selector).next(),
                None => Some(title_el),
            };
            let Some(link) = link_el
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| base.join(href.trim()).ok())
            else {
                continue;
            };
            if !seen.insert(link.to_string()) {
                continue;
            }

            let mut record = Record::new(&source.id, title, link.to_string());
            if let Some(price) = optional_text(&item, selectors.price.as_ref()) {
                record = record.with_price(price);
            }
            if let Some(posted_at) = optional_text(&item, selectors.posted_at.as_ref()) {
                record = record.with_posted_at(posted_at);
            }
            records.push(record);
        }

        tracing::debug!(source = %source.id, records = records.len(), "Extracted records");
        Ok(records)
    }
}

/// Element text with whitespace runs collapsed.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn optional_text(item: &ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    let el = item.select(selector?).next()?;
    let text = element_text(&el);
    (!text.is_empty()).then_some(text)
}

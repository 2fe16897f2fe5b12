//! Posting extraction from search result markup.
//!
//! Every field is located through a [`SelectorChain`]: an ordered list of CSS
//! selectors where the first one producing a usable element wins. The site
//! ships several card layouts at once and changes them often, so later
//! selectors cover older or newer variants of the same field.

use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::cli::config::ExtractorSettings;
use crate::crawler::task::JobRecord;

/// Ordered fallback selectors for one field
#[derive(Debug)]
pub struct SelectorChain {
    field: &'static str,
    selectors: Vec<Selector>,
}

impl SelectorChain {
    /// Compile a chain; an invalid selector is a configuration error
    pub fn new(field: &'static str, css: &[String]) -> Result<Self> {
        let selectors = css.iter()
            .map(|s| Selector::parse(s).map_err(|e| anyhow!("Invalid {} selector '{}': {:?}", field, s, e)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { field, selectors })
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    /// First element, in chain order then document order, that `accept` takes
    pub fn find<'a, P>(&self, scope: ElementRef<'a>, accept: P) -> Option<ElementRef<'a>>
    where
        P: Fn(&ElementRef<'a>) -> bool,
    {
        self.selectors.iter()
            .find_map(|selector| scope.select(selector).find(|el| accept(el)))
    }

    /// Trimmed text of the first element with any text, or an empty string
    pub fn text(&self, scope: ElementRef<'_>) -> String {
        self.find(scope, |el| !element_text(el).is_empty())
            .map(|el| element_text(&el))
            .unwrap_or_default()
    }

    /// All matches of the first selector that matches anything
    pub fn all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        self.selectors.iter()
            .map(|selector| scope.select(selector).collect::<Vec<_>>())
            .find(|matches| !matches.is_empty())
            .unwrap_or_default()
    }
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn non_empty_attr<'a>(el: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value().attr(name).map(str::trim).filter(|v| !v.is_empty())
}

/// Turns one search page into job records
#[derive(Debug)]
pub struct ListingExtractor {
    site_origin: String,
    card: SelectorChain,
    title_link: SelectorChain,
    company: SelectorChain,
    location: SelectorChain,
    posted_date: SelectorChain,
}

impl ListingExtractor {
    pub fn new(settings: &ExtractorSettings, site_origin: &str) -> Result<Self> {
        Ok(Self {
            site_origin: site_origin.trim_end_matches('/').to_string(),
            card: SelectorChain::new("card", &settings.card)?,
            title_link: SelectorChain::new("title_link", &settings.title_link)?,
            company: SelectorChain::new("company", &settings.company)?,
            location: SelectorChain::new("location", &settings.location)?,
            posted_date: SelectorChain::new("posted_date", &settings.posted_date)?,
        })
    }

    /// Extract records in document order; cards without a link are dropped
    pub fn extract(&self, markup: &str) -> Vec<JobRecord> {
        let document = Html::parse_document(markup);
        let cards = self.card.all(document.root_element());

        if cards.is_empty() {
            warn!("No posting cards found on page; the result markup may have changed");
            return Vec::new();
        }

        let records: Vec<JobRecord> = cards.into_iter()
            .filter_map(|card| self.extract_card(card))
            .collect();

        debug!("Extracted {} records from page", records.len());
        records
    }

    fn extract_card(&self, card: ElementRef<'_>) -> Option<JobRecord> {
        let link = match self.title_link.find(card, |el| non_empty_attr(el, "href").is_some()) {
            Some(link) => link,
            None => {
                debug!("Skipping card without a {} element", self.title_link.field());
                return None;
            }
        };

        let href = non_empty_attr(&link, "href")?;
        let url = self.absolutize(href);

        let title = non_empty_attr(&link, "aria-label")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(&link));

        Some(JobRecord {
            title,
            company: self.company.text(card),
            location: self.location.text(card),
            posted_date: self.posted_date.text(card),
            url,
        })
    }

    /// Site-relative links get the origin prepended; anything else is kept as-is
    fn absolutize(&self, href: &str) -> String {
        if href.starts_with('/') {
            format!("{}{}", self.site_origin, href)
        } else {
            href.to_string()
        }
    }
}

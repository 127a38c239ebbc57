//! Source adapter contract + the nekretnine.rs listing-page adapter.

use async_trait::async_trait;
use chrono::NaiveDate;
use nekretnine_core::{Listing, NEKRETNINE_SOURCE_NAME};
use nekretnine_storage::{FetchError, PageSource};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://nekretnine.rs";

/// Rentals in Belgrade, central heating, 40m²+, up to 700 EUR, not ground or top floor.
pub const DEFAULT_QUERY_FILTERS: &str = "izdavanje-prodaja/izdavanje/grad/beograd/vrsta-grejanja/centralno-grejanje/kvadratura/40_1000000/cena/1_700/na-spratu/2_3_4_5_6_nije-poslednji-sprat/lista/po-stranici/20";

const LISTING_PATH: &str = "stambeni-objekti/stambeni-objekti/stanovi";

/// Posted-date format on listing cards (`dd.MM.yyyy`).
pub const POSTED_DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// CSS selectors describing one listing card and its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CardSelectors {
    card: String,
    link: String,
    meta_info: String,
    price: String,
    location: String,
}

impl Default for CardSelectors {
    fn default() -> Self {
        Self {
            card: ".offer-body".to_string(),
            link: ".offer-title a".to_string(),
            meta_info: ".offer-meta-info".to_string(),
            price: ".offer-price span".to_string(),
            location: ".offer-location".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledSelectors {
    card: Selector,
    link: Selector,
    meta_info: Selector,
    price: Selector,
    location: Selector,
}

impl CompiledSelectors {
    fn compile(selectors: &CardSelectors) -> Result<Self, AdapterError> {
        Ok(Self {
            card: parse_selector(&selectors.card)?,
            link: parse_selector(&selectors.link)?,
            meta_info: parse_selector(&selectors.meta_info)?,
            price: parse_selector(&selectors.price)?,
            location: parse_selector(&selectors.location)?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    fn listing_page_url(&self, page_index: u32) -> String;

    async fn fetch_listing(
        &self,
        http: &dyn PageSource,
        page_index: u32,
    ) -> Result<String, AdapterError> {
        let url = self.listing_page_url(page_index);
        Ok(http.fetch_page(&url).await?)
    }

    /// Cards posted on `today`, in document order.
    fn parse_listing(&self, html: &str, today: NaiveDate) -> Result<Vec<Listing>, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct NekretnineAdapter {
    base_url: String,
    query_filters: String,
    selectors: CompiledSelectors,
}

impl NekretnineAdapter {
    pub fn new(
        base_url: impl Into<String>,
        query_filters: impl Into<String>,
    ) -> Result<Self, AdapterError> {
        Self::with_selectors(base_url, query_filters, &CardSelectors::default())
    }

    pub(crate) fn with_selectors(
        base_url: impl Into<String>,
        query_filters: impl Into<String>,
        selectors: &CardSelectors,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            query_filters: query_filters.into(),
            selectors: CompiledSelectors::compile(selectors)?,
        })
    }

    fn parse_card(&self, card: ElementRef<'_>, today: NaiveDate) -> Option<Listing> {
        let Some(date_text) = card
            .select(&self.selectors.meta_info)
            .next()
            .map(|meta| posted_date_segment(&element_text(meta)))
        else {
            debug!("skipping card without meta info");
            return None;
        };

        let Some(posted) = parse_posted_date(&date_text) else {
            debug!(date_text = %date_text, "skipping card with unparsable posted date");
            return None;
        };
        if posted != today {
            return None;
        }

        let href = card
            .select(&self.selectors.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();
        let price = first_text(card, &self.selectors.price);
        let location = first_text(card, &self.selectors.location);

        Some(Listing::new(
            NEKRETNINE_SOURCE_NAME,
            price,
            location,
            format!("{}{}", self.base_url, href),
        ))
    }
}

#[async_trait]
impl SourceAdapter for NekretnineAdapter {
    fn source_id(&self) -> &'static str {
        "nekretnine"
    }

    fn listing_page_url(&self, page_index: u32) -> String {
        format!(
            "{}/{}/{}/stranica/{}/",
            self.base_url,
            LISTING_PATH,
            self.query_filters.trim_matches('/'),
            page_index
        )
    }

    fn parse_listing(&self, html: &str, today: NaiveDate) -> Result<Vec<Listing>, AdapterError> {
        let document = Html::parse_document(html);
        let mut cards = 0usize;
        let listings = document
            .select(&self.selectors.card)
            .inspect(|_| cards += 1)
            .filter_map(|card| self.parse_card(card, today))
            .collect::<Vec<_>>();
        debug!(cards, listings = listings.len(), %today, "parsed listing page");
        Ok(listings)
    }
}

pub fn nekretnine_adapter() -> Result<NekretnineAdapter, AdapterError> {
    NekretnineAdapter::new(DEFAULT_BASE_URL, DEFAULT_QUERY_FILTERS)
}

/// `"24.02.2026 | Izdavanje | Stan"` -> `"24.02.2026"`.
fn posted_date_segment(meta_text: &str) -> String {
    meta_text
        .split('|')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub fn parse_posted_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), POSTED_DATE_FORMAT).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(card: ElementRef<'_>, selector: &Selector) -> String {
    card.select(selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

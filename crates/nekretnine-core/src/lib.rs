//! Core domain model for the Nekretnine listing notifier.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Category label attached to every listing scraped from nekretnine.rs.
pub const NEKRETNINE_SOURCE_NAME: &str = "Nekretnine";

/// One scraped real-estate offer.
///
/// `id` is the content fingerprint of the other four text fields and doubles as
/// the store key, so re-scraping an unchanged offer always maps onto the same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub name: String,
    pub price: String,
    pub location: String,
    pub url: String,
    pub visited: bool,
}

impl Listing {
    /// Build a fresh, unvisited listing with its fingerprint computed.
    pub fn new(
        name: impl Into<String>,
        price: impl Into<String>,
        location: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let price = price.into();
        let location = location.into();
        let url = url.into();
        let id = fingerprint(&name, &price, &location, &url);
        Self {
            id,
            name,
            price,
            location,
            url,
            visited: false,
        }
    }

    /// Plain-text notification body for this listing.
    pub fn notification_text(&self) -> String {
        format!(
            "{}: {}, {}\n{}\n",
            self.name, self.price, self.location, self.url
        )
    }
}

/// SHA-256 over `name,price,location,url`, hex encoded.
///
/// Embedded commas are not escaped; two listings whose fields only differ in
/// where a comma falls collapse onto one id.
pub fn fingerprint(name: &str, price: &str, location: &str, url: &str) -> String {
    let joined = [name, price, location, url].join(",");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}

/// Neighbourhoods outside the catchment area of the original Belgrade deployment.
pub const DEFAULT_EXCLUDED_LOCATION_PREFIXES: &[&str] = &[
    "Konjarnik",
    "Voždovac",
    "Višnjička",
    "Šumice",
    "Dušanovac",
    "Zemun",
    "Bežanijska kosa",
    "Vidikovac",
    "Mirijevo",
    "Miljakovac",
    "Lekino brdo",
    "Cerak",
    "Karaburma",
    "Novi Beograd Blok 4",
    "Novi Beograd Blok 5",
    "Novi Beograd Blok 6",
    "Novi Beograd Blok 7",
    "Novi Beograd Blok 1 (Fontana)",
    "Novi Beograd Blok 9a",
    "Novi Beograd Blok 11",
    "Novi Beograd Blok 28",
    "Novi Beograd Blok 34",
    "Novi Beograd Blok 37",
    "Novi Beograd Blok 38",
    "Rakovica",
    "Banjica",
    "Banovo brdo",
    "Žarkovo",
    "Tošin bunar",
    "Košutnjak",
    "Denkova bašta",
    "Medaković",
    "Stepa Stepanović",
    "Trošarina",
    "Braće Jerković",
    "Autokomanda",
    "Sremčica",
    "Čukarica",
    "Čukarička padina",
    "Labudovo brdo, Beograd, Srbija",
    "Batajnica, Beograd, Srbija",
];

/// Listing paths (relative to the site root) that are never delivered.
pub const DEFAULT_EXCLUDED_URL_PATH_PREFIXES: &[&str] = &["/stambeni-objekti/stanovi/zemun"];

/// Substrings of the listing URL that are never delivered.
pub const DEFAULT_EXCLUDED_URL_FRAGMENTS: &[&str] = &["dr-ivana-ribara"];

/// Exclusion set keyed by location prefix, plus optional URL rules.
///
/// Matching is byte-exact: no case folding and no Unicode normalisation, so
/// "Vozdovac" or a decomposed "Voždovac" does not match the configured name.
/// URL path prefixes are checked against the path of the listing URL (from
/// the first `/` after the host); URL fragments anywhere in the full URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFilter {
    location_prefixes: Vec<String>,
    url_path_prefixes: Vec<String>,
    url_fragments: Vec<String>,
}

impl LocationFilter {
    pub fn new(location_prefixes: Vec<String>) -> Self {
        Self {
            location_prefixes,
            ..Self::default()
        }
    }

    pub fn with_url_path_prefixes(mut self, url_path_prefixes: Vec<String>) -> Self {
        self.url_path_prefixes = url_path_prefixes;
        self
    }

    pub fn with_url_fragments(mut self, url_fragments: Vec<String>) -> Self {
        self.url_fragments = url_fragments;
        self
    }

    pub fn belgrade_defaults() -> Self {
        Self::new(owned(DEFAULT_EXCLUDED_LOCATION_PREFIXES))
            .with_url_path_prefixes(owned(DEFAULT_EXCLUDED_URL_PATH_PREFIXES))
            .with_url_fragments(owned(DEFAULT_EXCLUDED_URL_FRAGMENTS))
    }

    pub fn location_prefixes(&self) -> &[String] {
        &self.location_prefixes
    }

    pub fn url_path_prefixes(&self) -> &[String] {
        &self.url_path_prefixes
    }

    pub fn url_fragments(&self) -> &[String] {
        &self.url_fragments
    }

    pub fn is_excluded(&self, location: &str) -> bool {
        self.location_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && location.starts_with(prefix.as_str()))
    }

    pub fn is_url_excluded(&self, url: &str) -> bool {
        let path = url_path(url);
        self.url_path_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
            || self
                .url_fragments
                .iter()
                .any(|fragment| !fragment.is_empty() && url.contains(fragment.as_str()))
    }

    pub fn is_listing_excluded(&self, listing: &Listing) -> bool {
        self.is_excluded(&listing.location) || self.is_url_excluded(&listing.url)
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `https://host/a/b?q` -> `/a/b?q`. Relative URLs are returned as-is; an
/// absolute URL without a path yields `""`.
fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        None => url,
    }
}

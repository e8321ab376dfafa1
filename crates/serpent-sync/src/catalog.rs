//! Storefront catalog generation from the payment provider's products.
//!
//! Each active product is paired with its first active price and flattened
//! into a [`CatalogItem`]. Product metadata may override any of the display
//! fields; missing values fall back to fixed storefront defaults.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    client::{self, ClientConfig},
    error::{Result, SyncError},
    secret::Secret,
};

/// Default provider API origin.
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

const DEFAULT_NAME: &str = "Unknown Snake";
const DEFAULT_SPECIES: &str = "ball_python";
const DEFAULT_MORPH: &str = "normal";
const DEFAULT_INFO: &str = "Captive Bred";
const DEFAULT_SEX: &str = "unknown";
const DEFAULT_BIRTH_YEAR: i64 = 2024;
const DEFAULT_WEIGHT_GRAMS: i64 = 100;
const DEFAULT_IMAGE: &str = "🐍";
const PAYMENT_LINK_PREFIX: &str = "https://buy.stripe.com/test_";

/// Name fragments used to guess a species, checked in order.
const SPECIES_HINTS: &[(&str, &str)] = &[
    ("ball_python", "ball_python"),
    ("ball python", "ball_python"),
    ("corn_snake", "corn_snake"),
    ("corn snake", "corn_snake"),
];

/// Connection settings for the provider API.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API origin, without a trailing slash.
    pub api_base: String,
    /// Secret API key sent as a bearer token.
    pub api_key: Secret,
    /// HTTP client settings.
    pub client: ClientConfig,
}

impl ProviderConfig {
    /// Creates a configuration against the public API.
    pub fn new(api_key: impl Into<Secret>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            client: ClientConfig::default(),
        }
    }
}

/// A product as returned by the provider's product listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Product {
    /// Provider product id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Long description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the product is still on sale.
    #[serde(default)]
    pub active: bool,
    /// Free-form string metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A price attached to a product.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Price {
    /// Provider price id.
    pub id: String,
    /// Amount in minor currency units.
    #[serde(default)]
    pub unit_amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

/// One entry of the storefront catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Provider product id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Species slug, e.g. `ball_python`.
    pub species: String,
    /// Colour morph.
    pub morph: String,
    /// Price in major currency units.
    pub price: f64,
    /// Short provenance note.
    pub info: String,
    /// Sex of the animal.
    pub sex: String,
    /// Year of hatching.
    pub birth_year: i64,
    /// Weight in grams.
    pub weight_grams: i64,
    /// Long description.
    pub description: String,
    /// `available` or `sold`.
    pub status: String,
    /// Image reference or emoji.
    pub image: String,
    /// Checkout link for the product.
    pub stripe_link: String,
}

/// Client for the provider's product and price listings.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl CatalogClient {
    /// Creates a catalog client.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ConfigurationError` if the API key is empty or the
    /// HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(SyncError::configuration("provider API key is not set"));
        }
        let http = config.client.build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    fn timeout(&self) -> Duration {
        self.config.client.timeout
    }

    /// Lists active products, up to the provider's page size of 100.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ApiError` for non-success responses, and network,
    /// timeout or decode errors for transport failures.
    pub async fn list_active_products(&self) -> Result<Vec<Product>> {
        let request = self
            .http
            .get(self.url("/v1/products"))
            .bearer_auth(self.config.api_key.expose())
            .query(&[("active", "true"), ("limit", "100")]);

        let page: ListResponse<Product> = client::send_json(request, self.timeout())
            .instrument(info_span!("list_products"))
            .await?;

        if page.has_more {
            warn!(returned = page.data.len(), "More than one page of products; only the first is synced");
        }
        Ok(page.data)
    }

    /// Returns the first active price of a product.
    ///
    /// Lookup failures are logged and reported as `None`, which prices the
    /// product at zero.
    pub async fn first_active_price(&self, product_id: &str) -> Option<Price> {
        let request = self
            .http
            .get(self.url("/v1/prices"))
            .bearer_auth(self.config.api_key.expose())
            .query(&[("product", product_id), ("active", "true"), ("limit", "1")]);

        match client::send_json::<ListResponse<Price>>(request, self.timeout()).await {
            Ok(page) => page.data.into_iter().next(),
            Err(e) => {
                warn!(product_id, error = %e, "Price lookup failed");
                None
            },
        }
    }
}

/// Converts a provider product and its price into a catalog entry.
pub fn to_catalog_item(product: &Product, price: Option<&Price>) -> CatalogItem {
    let meta = |key: &str| product.metadata.get(key).map(String::as_str);
    let meta_or = |key: &str, default: &str| meta(key).unwrap_or(default).to_string();
    let meta_int = |key: &str, default: i64| {
        meta(key).and_then(|v| v.trim().parse::<i64>().ok()).unwrap_or(default)
    };

    let name = product.name.clone().unwrap_or_else(|| DEFAULT_NAME.to_string());

    let stripe_link = match meta("payment_link") {
        Some(link) if !link.is_empty() => link.to_string(),
        _ => format!("{PAYMENT_LINK_PREFIX}{}", product.id),
    };

    let price = price.and_then(|p| p.unit_amount).map_or(0.0, minor_to_major);

    CatalogItem {
        id: product.id.clone(),
        species: species_for(meta("species"), &name),
        name,
        morph: meta_or("morph", DEFAULT_MORPH),
        price,
        info: meta_or("info", DEFAULT_INFO),
        sex: meta_or("sex", DEFAULT_SEX),
        birth_year: meta_int("birth_year", DEFAULT_BIRTH_YEAR),
        weight_grams: meta_int("weight_grams", DEFAULT_WEIGHT_GRAMS),
        description: product.description.clone().unwrap_or_default(),
        status: if product.active { "available" } else { "sold" }.to_string(),
        image: meta_or("image", DEFAULT_IMAGE),
        stripe_link,
    }
}

#[allow(clippy::cast_precision_loss)]
fn minor_to_major(unit_amount: i64) -> f64 {
    unit_amount as f64 / 100.0
}

fn species_for(declared: Option<&str>, name: &str) -> String {
    if let Some(species) = declared.filter(|s| !s.is_empty()) {
        return species.to_lowercase();
    }
    let name = name.to_lowercase();
    SPECIES_HINTS
        .iter()
        .find(|&&(hint, _)| name.contains(hint))
        .map_or(DEFAULT_SPECIES, |&(_, species)| species)
        .to_string()
}

/// Fetches every active product, converts it, and writes the catalog file.
///
/// The file is a pretty-printed JSON array, written to a temporary sibling
/// and renamed into place. Missing parent directories are created.
///
/// # Errors
///
/// Returns the listing error if products cannot be fetched, or
/// `SyncError::OutputError` if the file cannot be written.
pub async fn sync_catalog(client: &CatalogClient, output: &Path) -> Result<Vec<CatalogItem>> {
    let products = client.list_active_products().await?;
    info!(count = products.len(), "Fetched active products");

    let mut items = Vec::with_capacity(products.len());
    for product in &products {
        let price = client.first_active_price(&product.id).await;
        let item = to_catalog_item(product, price.as_ref());
        debug!(
            product_id = %item.id,
            name = %item.name,
            price = item.price,
            species = %item.species,
            "Converted product"
        );
        items.push(item);
    }

    write_catalog(output, &items).await?;
    info!(count = items.len(), path = %output.display(), "Catalog written");
    Ok(items)
}

async fn write_catalog(output: &Path, items: &[CatalogItem]) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(output_error(parent))?;
    }

    let json = serde_json::to_vec_pretty(items)
        .map_err(|e| SyncError::decode(format!("catalog serialization failed: {e}")))?;

    let mut temp = output.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    tokio::fs::write(&temp, json).await.map_err(output_error(&temp))?;
    tokio::fs::rename(&temp, output).await.map_err(output_error(output))?;
    Ok(())
}

fn output_error(path: &Path) -> impl FnOnce(std::io::Error) -> SyncError {
    let path = path.to_path_buf();
    move |source| SyncError::OutputError { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: Option<&str>, meta: &[(&str, &str)]) -> Product {
        Product {
            id: id.to_string(),
            name: name.map(str::to_string),
            description: None,
            active: true,
            metadata: meta.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
        }
    }

    #[test]
    fn bare_product_gets_defaults() {
        let item = to_catalog_item(&product("prod_1", None, &[]), None);

        assert_eq!(item.name, "Unknown Snake");
        assert_eq!(item.species, "ball_python");
        assert_eq!(item.morph, "normal");
        assert_eq!(item.price, 0.0);
        assert_eq!(item.info, "Captive Bred");
        assert_eq!(item.sex, "unknown");
        assert_eq!(item.birth_year, 2024);
        assert_eq!(item.weight_grams, 100);
        assert_eq!(item.description, "");
        assert_eq!(item.status, "available");
        assert_eq!(item.image, "🐍");
        assert_eq!(item.stripe_link, "https://buy.stripe.com/test_prod_1");
    }

    #[test]
    fn metadata_overrides_defaults() {
        let p = product("prod_2", Some("Banana Ball"), &[
            ("species", "Corn_Snake"),
            ("morph", "banana"),
            ("sex", "female"),
            ("birth_year", "2023"),
            ("weight_grams", "450"),
            ("payment_link", "https://buy.stripe.com/abc"),
        ]);
        let price = Price { id: "price_1".into(), unit_amount: Some(15_000) };

        let item = to_catalog_item(&p, Some(&price));

        assert_eq!(item.species, "corn_snake");
        assert_eq!(item.morph, "banana");
        assert_eq!(item.sex, "female");
        assert_eq!(item.birth_year, 2023);
        assert_eq!(item.weight_grams, 450);
        assert_eq!(item.price, 150.0);
        assert_eq!(item.stripe_link, "https://buy.stripe.com/abc");
    }

    #[test]
    fn species_guessed_from_name() {
        let corn = to_catalog_item(&product("p", Some("Amelanistic Corn Snake"), &[]), None);
        let ball = to_catalog_item(&product("p", Some("Pastel BALL PYTHON"), &[]), None);
        let other = to_catalog_item(&product("p", Some("Kenyan Sand Boa"), &[]), None);

        assert_eq!(corn.species, "corn_snake");
        assert_eq!(ball.species, "ball_python");
        assert_eq!(other.species, "ball_python");
    }

    #[test]
    fn non_numeric_metadata_falls_back() {
        let p = product("p", Some("x"), &[("birth_year", "spring"), ("weight_grams", "")]);
        let item = to_catalog_item(&p, None);

        assert_eq!(item.birth_year, 2024);
        assert_eq!(item.weight_grams, 100);
    }

    #[test]
    fn inactive_product_is_sold() {
        let mut p = product("p", Some("x"), &[]);
        p.active = false;
        assert_eq!(to_catalog_item(&p, None).status, "sold");
    }

    #[test]
    fn empty_payment_link_is_generated() {
        let p = product("prod_9", Some("x"), &[("payment_link", "")]);
        assert_eq!(to_catalog_item(&p, None).stripe_link, "https://buy.stripe.com/test_prod_9");
    }

    #[test]
    fn missing_api_key_rejected_before_any_request() {
        let err = CatalogClient::new(ProviderConfig::new("")).unwrap_err();
        assert_eq!(err.code(), "E3001");
    }
}

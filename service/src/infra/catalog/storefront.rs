//! [Shopify Storefront API] [`Catalog`] implementation.
//!
//! [Shopify Storefront API]: https://shopify.dev/docs/api/storefront

use std::{str::FromStr as _, time::Duration};

use common::{
    operations::{By, Select},
    Currency, Money,
};
use derive_more::Debug;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracerr::Traced;
use tracing as log;

use crate::{domain::pool, infra::catalog};
#[cfg(doc)]
use crate::infra::Catalog;

/// [`Storefront`] configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Domain of the shop, like `shop.myshopify.com`.
    pub domain: String,

    /// Public Storefront API access token.
    #[debug(skip)]
    pub access_token: String,

    /// Version of the Storefront API, like `2024-10`.
    pub api_version: String,

    /// Timeout of a single request.
    pub timeout: Duration,
}

/// [`Catalog`] backed by the [Shopify Storefront API].
///
/// [Shopify Storefront API]: https://shopify.dev/docs/api/storefront
#[derive(Clone, Debug)]
pub struct Storefront {
    /// HTTP client performing requests.
    client: reqwest::Client,

    /// GraphQL endpoint of the shop.
    endpoint: String,

    /// Public Storefront API access token.
    #[debug(skip)]
    access_token: String,
}

impl Storefront {
    /// Creates a new [`Storefront`] [`Catalog`] with the provided [`Config`].
    ///
    /// # Errors
    ///
    /// If failed to build an HTTP client.
    pub fn new(config: Config) -> Result<Self, Traced<catalog::Error>> {
        let Config {
            domain,
            access_token,
            api_version,
            timeout,
        } = config;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(tracerr::from_and_wrap!(=> catalog::Error))?;

        Ok(Self {
            client,
            endpoint: format!("https://{domain}/api/{api_version}/graphql.json"),
            access_token,
        })
    }
}

impl catalog::Catalog<Select<By<Option<pool::Product>, pool::ProductHandle>>>
    for Storefront
{
    type Ok = Option<pool::Product>;
    type Err = Traced<catalog::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<pool::Product>, pool::ProductHandle>>,
    ) -> Result<Self::Ok, Self::Err> {
        use catalog::Error as E;

        let handle = by.into_inner();

        const QUERY: &str = "\
            query ProductByHandle($handle: String!) { \
                productByHandle(handle: $handle) { \
                    title \
                    featuredImage { url } \
                    priceRange { minVariantPrice { amount currencyCode } } \
                } \
            }";
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Shopify-Storefront-Access-Token", &self.access_token)
            .json(&json!({
                "query": QUERY,
                "variables": { "handle": AsRef::<str>::as_ref(&handle) },
            }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(tracerr::from_and_wrap!(=> E))?
            .json::<Response>()
            .await
            .map_err(tracerr::from_and_wrap!(=> E))?;

        if let Some(e) = response.errors.first() {
            return Err(tracerr::new!(E::Api(e.message.clone())));
        }
        let Some(product) = response.data.and_then(|d| d.product_by_handle)
        else {
            log::debug!("`Product({handle})` is not found in `Storefront`");
            return Ok(None);
        };

        product.into_domain(handle).map(Some).map_err(tracerr::wrap!())
    }
}

/// Storefront API GraphQL response.
#[derive(Debug, Deserialize)]
struct Response {
    /// Requested data, if any.
    data: Option<Data>,

    /// Errors of the request, if any.
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

/// Error reported by the Storefront API.
#[derive(Debug, Deserialize)]
struct GraphQlError {
    /// Human-readable description of the error.
    message: String,
}

/// Data of a `productByHandle` query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Data {
    /// Found product, if any.
    product_by_handle: Option<Product>,
}

/// Product as returned by the Storefront API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Product {
    /// Title of the product.
    title: String,

    /// Main image of the product, if any.
    featured_image: Option<Image>,

    /// Prices of the product variants.
    price_range: PriceRange,
}

/// Image as returned by the Storefront API.
#[derive(Debug, Deserialize)]
struct Image {
    /// URL of the image.
    url: String,
}

/// Price range of the product variants.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceRange {
    /// The cheapest variant price.
    min_variant_price: MoneyV2,
}

/// Monetary value as returned by the Storefront API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoneyV2 {
    /// Decimal amount.
    amount: String,

    /// ISO 4217 currency code.
    currency_code: String,
}

impl Product {
    /// Converts this [`Product`] into a [`pool::Product`] snapshot.
    fn into_domain(
        self,
        handle: pool::ProductHandle,
    ) -> Result<pool::Product, Traced<catalog::Error>> {
        use catalog::Error as E;

        let Self {
            title,
            featured_image,
            price_range: PriceRange { min_variant_price },
        } = self;

        let name = pool::ProductName::new(title.trim())
            .ok_or_else(|| tracerr::new!(E::InvalidProduct("empty title")))?;
        // Unusable image doesn't prevent funding the product.
        let image_url = featured_image.and_then(|i| pool::ImageUrl::new(i.url));
        let price = Money {
            amount: Decimal::from_str(&min_variant_price.amount).map_err(
                |_| tracerr::new!(E::InvalidProduct("malformed price amount")),
            )?,
            currency: Currency::from_str(&min_variant_price.currency_code)
                .map_err(|_| {
                    tracerr::new!(E::InvalidProduct("unsupported currency"))
                })?,
        };

        Ok(pool::Product {
            handle,
            name,
            image_url,
            price,
        })
    }
}

#[cfg(test)]
mod spec {
    use common::Currency;
    use rust_decimal::Decimal;

    use crate::domain::pool;

    use super::Response;

    #[test]
    fn parses_product() {
        let response: Response = serde_json::from_str(
            r#"{"data": {"productByHandle": {
                "title": "Air Fryer XL",
                "featuredImage": {"url": "https://cdn.shopify.com/a.png"},
                "priceRange": {"minVariantPrice": {
                    "amount": "459900.0", "currencyCode": "COP"
                }}
            }}}"#,
        )
        .unwrap();

        let product = response
            .data
            .unwrap()
            .product_by_handle
            .unwrap()
            .into_domain(pool::ProductHandle::new("air-fryer-xl").unwrap())
            .unwrap();

        assert_eq!(AsRef::<str>::as_ref(&product.name), "Air Fryer XL");
        assert_eq!(product.price.amount, Decimal::from(459_900));
        assert_eq!(product.price.currency, Currency::Cop);
        assert!(product.image_url.is_some());
    }

    #[test]
    fn parses_missing_product() {
        let response: Response =
            serde_json::from_str(r#"{"data": {"productByHandle": null}}"#)
                .unwrap();

        assert!(response.data.unwrap().product_by_handle.is_none());
        assert!(response.errors.is_empty());
    }

    #[test]
    fn rejects_unsupported_currency() {
        let response: Response = serde_json::from_str(
            r#"{"data": {"productByHandle": {
                "title": "Lamp",
                "featuredImage": null,
                "priceRange": {"minVariantPrice": {
                    "amount": "10.00", "currencyCode": "JPY"
                }}
            }}}"#,
        )
        .unwrap();

        let res = response
            .data
            .unwrap()
            .product_by_handle
            .unwrap()
            .into_domain(pool::ProductHandle::new("lamp").unwrap());

        assert!(res.is_err());
    }
}

//! Product [`Catalog`] implementations.

pub mod memory;
#[cfg(feature = "storefront")]
pub mod storefront;

use derive_more::{Display, Error as StdError, From};

#[cfg(doc)]
use crate::domain::pool::Product;

pub use self::memory::Memory;
#[cfg(feature = "storefront")]
pub use self::storefront::Storefront;

/// External catalog resolving [`Product`]s by their handles.
pub use common::Handler as Catalog;

/// [`Catalog`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    #[cfg(feature = "storefront")]
    /// HTTP request to the [`Storefront`] failed.
    #[display("HTTP request failed: {_0}")]
    #[from]
    Http(reqwest::Error),

    /// [`Catalog`] responded with an error.
    #[display("`Catalog` responded with an error: {_0}")]
    Api(#[error(not(source))] String),

    /// [`Catalog`] returned a [`Product`] not meeting the requirements.
    #[display("`Catalog` returned invalid `Product`: {_0}")]
    InvalidProduct(#[error(not(source))] &'static str),
}

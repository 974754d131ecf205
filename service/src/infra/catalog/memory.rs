//! In-memory [`Catalog`] implementation.

use std::{collections::HashMap, sync::Arc};

use common::operations::{By, Select};
use tracerr::Traced;

use crate::{domain::pool, infra::catalog};
#[cfg(doc)]
use crate::infra::Catalog;

/// [`Catalog`] of a fixed set of [`pool::Product`]s.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// [`pool::Product`]s of this [`Catalog`] by their handles.
    products: Arc<HashMap<pool::ProductHandle, pool::Product>>,
}

impl Memory {
    /// Creates a new [`Memory`] [`Catalog`] of the provided
    /// [`pool::Product`]s.
    #[must_use]
    pub fn new(products: impl IntoIterator<Item = pool::Product>) -> Self {
        Self {
            products: Arc::new(
                products
                    .into_iter()
                    .map(|p| (p.handle.clone(), p))
                    .collect(),
            ),
        }
    }
}

impl catalog::Catalog<Select<By<Option<pool::Product>, pool::ProductHandle>>>
    for Memory
{
    type Ok = Option<pool::Product>;
    type Err = Traced<catalog::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<pool::Product>, pool::ProductHandle>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.products.get(&by.into_inner()).cloned())
    }
}

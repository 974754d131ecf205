//! Service contains the business logic of the application.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod domain;
#[cfg(test)]
mod fixture;
pub mod infra;
pub mod query;
pub mod read;
pub mod task;

use common::operations::{By, Start};
use derive_more::{Debug, Error};

#[cfg(doc)]
use infra::{Broadcaster, Catalog, Database};

pub use self::{command::Command, query::Query, task::Task};

/// [`Service`] configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    /// [`command::retry::Policy`] of storage transactions.
    pub retry: command::retry::Policy,

    /// [`task::ReconcilePools`] configuration.
    pub reconcile_pools: task::reconcile_pools::Config,
}

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Db, Br, Ct> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Database`] of this [`Service`].
    database: Db,

    /// [`Broadcaster`] of this [`Service`].
    broadcaster: Br,

    /// [`Catalog`] of this [`Service`].
    catalog: Ct,
}

impl<Db, Br, Ct> Service<Db, Br, Ct> {
    /// Creates a new [`Service`] with the provided parameters.
    pub fn new(
        config: Config,
        database: Db,
        broadcaster: Br,
        catalog: Ct,
    ) -> (Self, task::Background)
    where
        Self: Task<
                Start<
                    By<
                        task::ReconcilePools<Self>,
                        task::reconcile_pools::Config,
                    >,
                >,
                Ok = (),
                Err: Error,
            > + Clone
            + 'static,
    {
        let this = Service {
            config,
            database,
            broadcaster,
            catalog,
        };

        let mut bg = task::Background::default();
        let svc = this.clone();
        bg.spawn("ReconcilePools", async move {
            svc.execute(Start(By::new(svc.config().reconcile_pools)))
                .await
        });

        (this, bg)
    }

    /// Returns [`Config`] of this [`Service`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Database`] of this [`Service`].
    #[must_use]
    pub fn database(&self) -> &Db {
        &self.database
    }

    /// Returns [`Broadcaster`] of this [`Service`].
    #[must_use]
    pub fn broadcaster(&self) -> &Br {
        &self.broadcaster
    }

    /// Returns [`Catalog`] of this [`Service`].
    #[must_use]
    pub fn catalog(&self) -> &Ct {
        &self.catalog
    }
}

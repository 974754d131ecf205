//! [`Contribution`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{unit, DateTimeOf, Money};
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::Pool;
use crate::domain::{pool, user};

/// Money pledged by a single user towards a [`Pool`] goal.
///
/// [`Contribution`]s form an append-only ledger: they're never changed nor
/// deleted once committed.
#[derive(Clone, Debug)]
pub struct Contribution {
    /// ID of this [`Contribution`].
    pub id: Id,

    /// ID of the [`Pool`] this [`Contribution`] is made to.
    pub pool_id: pool::Id,

    /// ID of the user who made this [`Contribution`].
    pub contributor_id: user::Id,

    /// Contributed amount, in the currency of the [`Pool`].
    pub amount: Money,

    /// [`RequestToken`] this [`Contribution`] was made with, if any.
    pub request_token: Option<RequestToken>,

    /// [`DateTime`] when this [`Contribution`] was made.
    pub created_at: CreationDateTime,
}

/// ID of a [`Contribution`].
///
/// Ordered by creation time of the [`Contribution`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct Id(Uuid);

impl Id {
    /// Creates a new unique [`Id`] ordered after all the previously created
    /// ones.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

/// Client-supplied token making [`Contribution`] requests idempotent.
///
/// Unique in scope of a single [`Pool`]: repeating a request with the same
/// [`RequestToken`] returns the already made [`Contribution`] instead of
/// making a new one.
#[derive(AsRef, Clone, Debug, Display, Eq, Hash, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct RequestToken(String);

impl RequestToken {
    /// Creates a new [`RequestToken`] if the given `token` is valid.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        Self::check(&token).then_some(Self(token))
    }

    /// Generates a new unique [`RequestToken`].
    ///
    /// Used for requests not supplying any, so their retries stay idempotent
    /// as well.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Checks whether the given `token` is a valid [`RequestToken`].
    fn check(token: impl AsRef<str>) -> bool {
        let token = token.as_ref();
        !token.is_empty()
            && token.len() <= 128
            && token.chars().all(|c| c.is_ascii_graphic())
    }
}

impl FromStr for RequestToken {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `RequestToken`")
    }
}

/// [`DateTime`] when a [`Contribution`] was made.
pub type CreationDateTime = DateTimeOf<(Contribution, unit::Creation)>;

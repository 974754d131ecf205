//! [`Pool`] definitions.

use std::sync::LazyLock;

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, Currency, DateTimeOf, Money, Percent};
use derive_more::{AsRef, Display, Error, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user;

/// Shared funding goal of many users towards a purchase of a single product
/// (a "vaca").
///
/// Once created, only [`Pool::current_amount`], [`Pool::status`] and
/// [`Pool::completed_at`] ever change, and only by accruing contributions.
#[derive(Clone, Debug)]
pub struct Pool {
    /// ID of this [`Pool`].
    pub id: Id,

    /// ID of the user this [`Pool`] is funded for.
    pub owner_id: user::Id,

    /// Snapshot of the [`Product`] being funded, taken at creation.
    pub product: Product,

    /// Amount to be raised, denominating the [`Currency`] of this [`Pool`].
    pub goal: Money,

    /// Amount raised so far.
    ///
    /// Always equals to the sum of all the contributions made to this
    /// [`Pool`].
    pub current_amount: Decimal,

    /// [`Status`] of this [`Pool`].
    pub status: Status,

    /// [`DateTime`] when this [`Pool`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Pool`] reached its goal, if it did.
    pub completed_at: Option<CompletionDateTime>,
}

impl Pool {
    /// Creates a new [`Status::Active`] [`Pool`] with nothing raised yet.
    #[must_use]
    pub fn new(owner_id: user::Id, product: Product, goal: Money) -> Self {
        Self {
            id: Id::new(),
            owner_id,
            product,
            goal,
            current_amount: Decimal::ZERO,
            status: Status::Active,
            created_at: CreationDateTime::now(),
            completed_at: None,
        }
    }

    /// Returns [`Currency`] of this [`Pool`].
    #[must_use]
    pub fn currency(&self) -> Currency {
        self.goal.currency
    }

    /// Returns the raised [`Money`] of this [`Pool`].
    #[must_use]
    pub fn current(&self) -> Money {
        Money {
            amount: self.current_amount,
            currency: self.currency(),
        }
    }

    /// Returns the [`Percent`] of the goal raised so far.
    #[must_use]
    pub fn percentage(&self) -> Percent {
        Percent::ratio(self.current_amount, self.goal.amount)
    }

    /// Indicates whether this [`Pool`] still accepts contributions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Indicates whether the raised amount meets or exceeds the goal.
    #[must_use]
    pub fn is_goal_reached(&self) -> bool {
        self.current_amount >= self.goal.amount
    }

    /// Accrues the provided `amount` to this [`Pool`], completing it once the
    /// goal is reached.
    ///
    /// Returns `false` without changing anything if this [`Pool`] is not
    /// [`Status::Active`]. The whole `amount` is accrued even if it exceeds
    /// the goal.
    ///
    /// Storages must perform exactly the same transition atomically.
    ///
    /// # Errors
    ///
    /// With [`AmountOverflow`] if the raised amount cannot be represented,
    /// leaving this [`Pool`] unchanged.
    pub fn accrue(
        &mut self,
        amount: Decimal,
        at: CompletionDateTime,
    ) -> Result<bool, AmountOverflow> {
        if !self.is_active() {
            return Ok(false);
        }
        self.current_amount = self
            .current_amount
            .checked_add(amount)
            .ok_or(AmountOverflow)?;
        if self.is_goal_reached() {
            self.status = Status::Completed;
            self.completed_at = Some(at);
        }
        Ok(true)
    }
}

/// Greatest amount of a [`Pool`] goal or of a single contribution.
///
/// [`Pool::current_amount`] never exceeds twice this value.
pub const MAX_AMOUNT: Decimal =
    Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

/// Checks whether the provided [`Money`] is acceptable as a [`Pool`] goal or
/// as a contribution: positive and not greater than [`MAX_AMOUNT`].
#[must_use]
pub fn is_valid_amount(money: &Money) -> bool {
    money.is_positive() && money.amount <= MAX_AMOUNT
}

/// Error of accruing to a [`Pool`] more than can be represented.
#[derive(Clone, Copy, Debug, Display, Error)]
#[display("`Pool` raised amount overflowed")]
pub struct AmountOverflow;

/// ID of a [`Pool`].
///
/// Ordered by creation time of the [`Pool`].
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

/// Snapshot of a product from the external catalog.
///
/// Captured once a [`Pool`] is created and never updated, since the catalog
/// may change or remove the product later.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Product {
    /// [`ProductHandle`] referencing the product in the catalog.
    pub handle: ProductHandle,

    /// [`ProductName`] of the product.
    pub name: ProductName,

    /// [`ImageUrl`] of the product, if any.
    pub image_url: Option<ImageUrl>,

    /// Unit price of the product.
    pub price: Money,
}

/// Handle of a product in the external catalog.
#[derive(AsRef, Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct ProductHandle(String);

impl ProductHandle {
    /// Creates a new [`ProductHandle`] if the given `handle` is valid.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Option<Self> {
        let handle = handle.into();
        Self::check(&handle).then_some(Self(handle))
    }

    /// Checks whether the given `handle` is a valid [`ProductHandle`].
    fn check(handle: impl AsRef<str>) -> bool {
        /// Regular expression checking [`ProductHandle`] invariants:
        /// - Must consist of lowercase letters, digits and single hyphens;
        /// - Must not start/end with a hyphen;
        /// - Must be between 1 and 255 characters long.
        static REGEX: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^[\p{Ll}\p{N}]+(-[\p{Ll}\p{N}]+)*$")
                .expect("valid regex")
        });

        let handle = handle.as_ref();
        handle.len() <= 255 && REGEX.is_match(handle)
    }
}

impl FromStr for ProductHandle {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `ProductHandle`")
    }
}

/// Name of a [`Product`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct ProductName(String);

impl ProductName {
    /// Creates a new [`ProductName`] if the given `name` is valid.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        Self::check(&name).then_some(Self(name))
    }

    /// Checks whether the given `name` is a valid [`ProductName`].
    fn check(name: impl AsRef<str>) -> bool {
        let name = name.as_ref();
        name.trim() == name && !name.is_empty() && name.len() <= 512
    }
}

impl FromStr for ProductName {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `ProductName`")
    }
}

/// URL of a [`Product`] image.
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct ImageUrl(String);

impl ImageUrl {
    /// Creates a new [`ImageUrl`] if the given `url` is valid.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        Self::check(&url).then_some(Self(url))
    }

    /// Checks whether the given `url` is a valid [`ImageUrl`].
    fn check(url: impl AsRef<str>) -> bool {
        let url = url.as_ref();
        (url.starts_with("https://") || url.starts_with("http://"))
            && !url.contains(char::is_whitespace)
            && url.len() <= 2048
    }
}

impl FromStr for ImageUrl {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `ImageUrl`")
    }
}

define_kind! {
    #[doc = "Status of a [`Pool`]."]
    enum Status {
        #[doc = "[`Pool`] accepts contributions."]
        Active = 1,

        #[doc = "[`Pool`] reached its goal and accepts nothing anymore."]
        Completed = 2,
    }
}

/// [`DateTime`] when a [`Pool`] was created.
pub type CreationDateTime = DateTimeOf<(Pool, unit::Creation)>;

/// [`DateTime`] when a [`Pool`] was completed.
pub type CompletionDateTime = DateTimeOf<(Pool, unit::Completion)>;

#[cfg(test)]
mod spec {
    use common::{Currency, Money};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::domain::user;

    use super::{
        is_valid_amount, CompletionDateTime, Pool, Product, ProductHandle,
        ProductName, Status, MAX_AMOUNT,
    };

    fn pool(goal: i64) -> Pool {
        Pool::new(
            user::Id::from(Uuid::new_v4()),
            Product {
                handle: ProductHandle::new("air-fryer-xl").unwrap(),
                name: ProductName::new("Air Fryer XL").unwrap(),
                image_url: None,
                price: Money {
                    amount: Decimal::from(goal),
                    currency: Currency::Cop,
                },
            },
            Money {
                amount: Decimal::from(goal),
                currency: Currency::Cop,
            },
        )
    }

    #[test]
    fn accrues_until_goal() {
        let mut p = pool(100_000);

        assert!(p
            .accrue(Decimal::from(60_000), CompletionDateTime::now())
            .unwrap());
        assert_eq!(p.status, Status::Active);
        assert_eq!(p.percentage().value(), Decimal::from(60));
        assert!(p.completed_at.is_none());

        assert!(p
            .accrue(Decimal::from(50_000), CompletionDateTime::now())
            .unwrap());
        assert_eq!(p.current_amount, Decimal::from(110_000));
        assert_eq!(p.status, Status::Completed);
        assert_eq!(p.percentage().value(), Decimal::from(100));
        assert!(p.completed_at.is_some());
    }

    #[test]
    fn completes_on_exact_goal() {
        let mut p = pool(100);

        assert!(p
            .accrue(Decimal::from(100), CompletionDateTime::now())
            .unwrap());
        assert_eq!(p.status, Status::Completed);
    }

    #[test]
    fn rejects_accrual_once_completed() {
        let mut p = pool(100);
        assert!(p
            .accrue(Decimal::from(100), CompletionDateTime::now())
            .unwrap());
        let completed_at = p.completed_at;

        assert!(!p
            .accrue(Decimal::from(1), CompletionDateTime::now())
            .unwrap());
        assert_eq!(p.current_amount, Decimal::from(100));
        assert_eq!(p.completed_at, completed_at);
    }

    #[test]
    fn refuses_overflowing_accrual() {
        let mut p = pool(1);
        p.goal.amount = Decimal::MAX;
        let half = Decimal::MAX / Decimal::TWO + Decimal::ONE;
        assert!(p.accrue(half, CompletionDateTime::now()).unwrap());

        assert!(p.accrue(half, CompletionDateTime::now()).is_err());
        assert_eq!(p.current_amount, half);
        assert_eq!(p.status, Status::Active);
    }

    #[test]
    fn bounds_amounts() {
        let money = |amount| Money {
            amount,
            currency: Currency::Cop,
        };

        assert_eq!(MAX_AMOUNT, Decimal::from(1_000_000_000_000_000_i64));
        assert!(is_valid_amount(&money(Decimal::new(1, 2))));
        assert!(is_valid_amount(&money(MAX_AMOUNT)));

        assert!(!is_valid_amount(&money(Decimal::ZERO)));
        assert!(!is_valid_amount(&money(MAX_AMOUNT + Decimal::ONE)));
        assert!(!is_valid_amount(&money(Decimal::MAX)));
    }

    #[test]
    fn ids_are_ordered_by_creation() {
        let first = pool(1).id;
        let second = pool(1).id;

        assert!(first < second);
    }

    #[test]
    fn validates_product_handle() {
        assert!(ProductHandle::new("air-fryer-xl").is_some());
        assert!(ProductHandle::new("camiseta-niño-2").is_some());
        assert!(ProductHandle::new("x").is_some());

        assert!(ProductHandle::new("").is_none());
        assert!(ProductHandle::new("-leading").is_none());
        assert!(ProductHandle::new("trailing-").is_none());
        assert!(ProductHandle::new("double--hyphen").is_none());
        assert!(ProductHandle::new("Upper-Case").is_none());
        assert!(ProductHandle::new("with space").is_none());
        assert!(ProductHandle::new("a".repeat(256)).is_none());
    }
}

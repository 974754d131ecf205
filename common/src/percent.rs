//! [`Percent`]-related definitions.

use std::str::FromStr;

use derive_more::Display;
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use rust_decimal::{Decimal, RoundingStrategy};

/// Floating-point percentage in `[0, 100]` range.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Percent(Decimal);

impl Percent {
    /// Zero [`Percent`].
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// A whole, `100` [`Percent`].
    pub const FULL: Self = Self(Decimal::ONE_HUNDRED);

    /// Creates a new [`Percent`] by checking the provided values is
    /// greater than `0` and less than `100`.
    #[must_use]
    pub fn new(val: Decimal) -> Option<Self> {
        if val < Decimal::ZERO || val > Decimal::ONE_HUNDRED {
            None
        } else {
            Some(Self(val.normalize()))
        }
    }

    /// Calculates the [`Percent`] the `part` constitutes of the `whole`,
    /// truncated to two decimal places.
    ///
    /// Saturates at [`Percent::FULL`] once the `part` reaches the `whole`, and
    /// at [`Percent::ZERO`] for non-positive `part`s. A `part` less than the
    /// `whole` never gives [`Percent::FULL`].
    #[must_use]
    pub fn ratio(part: Decimal, whole: Decimal) -> Self {
        if whole <= Decimal::ZERO || part >= whole {
            return Self::FULL;
        }
        if part <= Decimal::ZERO {
            return Self::ZERO;
        }

        part.checked_div(whole)
            .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
            .map(|val| {
                val.round_dp_with_strategy(2, RoundingStrategy::ToZero)
                    .min(Decimal::new(9999, 2))
            })
            .and_then(Self::new)
            .unwrap_or(Self::ZERO)
    }

    /// Returns the [`Decimal`] value of this [`Percent`].
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }
}

impl FromStr for Percent {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s)
            .ok()
            .and_then(Self::new)
            .ok_or("invalid percent value")
    }
}

#[cfg(feature = "juniper")]
mod juniper {
    //! Module providing integration with [`juniper`] crate.

    use std::str::FromStr as _;

    use juniper::{graphql_scalar, InputValue, ScalarValue, Value};

    /// Floating-point percentage in `[0, 100]` range.
    #[graphql_scalar(with = Self, parse_token(String))]
    type Percent = super::Percent;

    impl Percent {
        fn to_output<S: ScalarValue>(m: &Percent) -> Value<S> {
            Value::scalar(m.to_string())
        }

        fn from_input<S: ScalarValue>(
            input: &InputValue<S>,
        ) -> Result<Self, String> {
            input
                .as_string_value()
                .ok_or_else(|| {
                    format!(
                        "Cannot parse `Percent` input scalar from \
                         non-string value: {input}",
                    )
                })
                .and_then(|s| {
                    Self::from_str(s).map_err(|e| {
                        format!("Cannot parse `Percent` input scalar: {e}")
                    })
                })
        }
    }
}

#[cfg(test)]
mod spec {
    use rust_decimal::Decimal;

    use super::Percent;

    fn decimal(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn ratio() {
        assert_eq!(
            Percent::ratio(decimal("60000"), decimal("100000")).value(),
            decimal("60"),
        );
        assert_eq!(
            Percent::ratio(decimal("1"), decimal("3")).value(),
            decimal("33.33"),
        );
        assert_eq!(
            Percent::ratio(decimal("2"), decimal("3")).value(),
            decimal("66.66"),
        );
        assert_eq!(Percent::ratio(decimal("0"), decimal("10")), Percent::ZERO);
    }

    #[test]
    fn ratio_saturates() {
        assert_eq!(
            Percent::ratio(decimal("100000"), decimal("100000")),
            Percent::FULL,
        );
        assert_eq!(
            Percent::ratio(decimal("110000"), decimal("100000")),
            Percent::FULL,
        );
        assert_eq!(Percent::ratio(decimal("5"), decimal("0")), Percent::FULL);
    }

    #[test]
    fn ratio_stays_below_full_until_whole() {
        assert_eq!(
            Percent::ratio(decimal("99996"), decimal("100000")).value(),
            decimal("99.99"),
        );
        assert_eq!(
            Percent::ratio(decimal("99.99"), decimal("100")).value(),
            decimal("99.99"),
        );
    }

    #[test]
    fn ratio_of_huge_amounts() {
        let whole = Decimal::MAX;
        let part = whole / Decimal::TWO;

        assert_eq!(Percent::ratio(part, whole).value(), decimal("50"));
        assert_eq!(
            Percent::ratio(whole - whole / Decimal::ONE_THOUSAND, whole)
                .value(),
            decimal("99.9"),
        );
        assert_eq!(
            Percent::ratio(whole - Decimal::ONE, whole).value(),
            decimal("99.99"),
        );
    }

    #[test]
    fn displays_without_trailing_zeros() {
        assert_eq!(
            Percent::ratio(decimal("60000"), decimal("100000")).to_string(),
            "60",
        );
        assert_eq!(Percent::FULL.to_string(), "100");
    }

    #[test]
    fn from_str() {
        assert_eq!("12.5".parse::<Percent>().unwrap().value(), decimal("12.5"));
        assert!("100.01".parse::<Percent>().is_err());
        assert!("-1".parse::<Percent>().is_err());
    }
}

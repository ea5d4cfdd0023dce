use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------     Currency       ----------------------------------------------------------
/// The currency an [`Amount`] is denominated in.
///
/// `Currency::None` is the currency of the zero amount. It is compatible with every other currency, so that freshly
/// constructed (`Amount::zero()`) values can be compared against amounts in any real currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    None,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    /// The three-letter code used in metric keys and display strings.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::None => "NONE",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

//--------------------------------------     Amount       ------------------------------------------------------------
/// A monetary quantity in micro-units of its currency.
///
/// Amounts are values the matcher compares and passes through, never computes with: ordering and equality are
/// only defined between compatible amounts (same currency, or either side zero), and comparing amounts in two
/// different real currencies yields no ordering.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Amount {
    value: i64,
    currency: Currency,
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as an Amount: {0}")]
pub struct AmountConversionError(String);

impl Amount {
    pub fn new(value: i64, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// The zero amount, compatible with every currency.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// True if the two amounts may be combined: same currency, or either is zero.
    pub fn is_compatible_with(&self, other: &Amount) -> bool {
        self.currency == other.currency || self.is_zero() || other.is_zero()
    }

    pub fn try_from_u64(value: u64, currency: Currency) -> Result<Self, AmountConversionError> {
        if value > i64::MAX as u64 {
            Err(AmountConversionError(format!("Value {value} is too large to convert to Amount")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self::new(value as i64, currency))
        }
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        if self.is_zero() && other.is_zero() {
            return true;
        }
        self.currency == other.currency && self.value == other.value
    }
}

impl Eq for Amount {}

impl PartialOrd for Amount {
    /// Ordering is only defined between compatible amounts; `None` otherwise.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !self.is_compatible_with(other) {
            return None;
        }
        Some(self.value.cmp(&other.value))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_zero() {
            write!(f, "0")
        } else {
            let major = self.value as f64 / 1_000_000.0;
            write!(f, "{major:0.6}{}", self.currency.code())
        }
    }
}

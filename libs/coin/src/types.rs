use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

/// Price in hundredths of the quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(i64);

impl Price {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Scale a quoted decimal by 100, truncating toward zero.
    /// Returns `None` if the result does not fit in an `i64`.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        let scaled = value.checked_mul(Decimal::ONE_HUNDRED)?.trunc();
        scaled.to_i64().map(Self)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.to_decimal())
    }
}

/// Store-generated identity of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(Uuid);

impl SymbolId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One price sample, timestamped by the source in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub price: Price,
    pub observed_at: i64,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn scales_quote_to_cents() {
        let price = Price::from_decimal(Decimal::from_str("42.37").unwrap()).unwrap();
        assert_eq!(price.cents(), 4237);
        assert_eq!(price.to_decimal(), Decimal::from_str("42.37").unwrap());
        assert_eq!(price.to_string(), "42.37");
    }

    #[test]
    fn truncates_sub_cent_precision() {
        let price = Price::from_decimal(Decimal::from_str("0.29").unwrap()).unwrap();
        assert_eq!(price.cents(), 29);

        let price = Price::from_decimal(Decimal::from_str("61234.5678").unwrap()).unwrap();
        assert_eq!(price.cents(), 6123456);
        assert_eq!(price.to_string(), "61234.56");
    }

    #[test]
    fn displays_whole_prices_with_two_decimals() {
        assert_eq!(Price::from_cents(500).to_string(), "5.00");
        assert_eq!(Price::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn symbol_id_round_trips_through_text() {
        let id = SymbolId::generate();
        assert_eq!(SymbolId::parse(&id.to_string()), Some(id));
        assert_eq!(SymbolId::parse("not-a-uuid"), None);
    }
}

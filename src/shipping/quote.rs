use crate::shipping::types::CourierQuote;
use std::str::FromStr;

/// Which courier to offer when the aggregator lists several for a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteSelection {
    /// Take the first entry as listed. The aggregator does not sort by price,
    /// so this is not necessarily the cheapest.
    FirstListed,
    /// Cheapest rate; ties keep the listed order
    #[default]
    LowestRate,
}

impl QuoteSelection {
    pub fn select(&self, quotes: Vec<CourierQuote>) -> Option<CourierQuote> {
        match self {
            QuoteSelection::FirstListed => quotes.into_iter().next(),
            QuoteSelection::LowestRate => quotes.into_iter().min_by(|a, b| a.rate.cmp(&b.rate)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteSelection::FirstListed => "first_listed",
            QuoteSelection::LowestRate => "lowest_rate",
        }
    }
}

impl FromStr for QuoteSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" | "first_listed" => Ok(QuoteSelection::FirstListed),
            "lowest" | "lowest_rate" | "cheapest" => Ok(QuoteSelection::LowestRate),
            other => Err(format!("unknown quote selection policy '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn quote(name: &str, rate: i64) -> CourierQuote {
        CourierQuote {
            courier_name: name.to_string(),
            etd: "3 days".to_string(),
            rate: Decimal::from(rate),
        }
    }

    fn unsorted() -> Vec<CourierQuote> {
        vec![quote("Delhivery", 120), quote("Xpressbees", 80), quote("Ekart", 95)]
    }

    #[test]
    fn first_listed_returns_head_even_when_not_cheapest() {
        let picked = QuoteSelection::FirstListed.select(unsorted()).unwrap();
        assert_eq!(picked.courier_name, "Delhivery");
    }

    #[test]
    fn lowest_rate_returns_cheapest() {
        let picked = QuoteSelection::LowestRate.select(unsorted()).unwrap();
        assert_eq!(picked.courier_name, "Xpressbees");
        assert_eq!(picked.rate, Decimal::from(80));
    }

    #[test]
    fn lowest_rate_ties_keep_listed_order() {
        let picked = QuoteSelection::LowestRate
            .select(vec![quote("A", 50), quote("B", 50)])
            .unwrap();
        assert_eq!(picked.courier_name, "A");
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert!(QuoteSelection::LowestRate.select(vec![]).is_none());
        assert!(QuoteSelection::FirstListed.select(vec![]).is_none());
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("first_listed".parse::<QuoteSelection>(), Ok(QuoteSelection::FirstListed));
        assert_eq!("LOWEST_RATE".parse::<QuoteSelection>(), Ok(QuoteSelection::LowestRate));
        assert!("random".parse::<QuoteSelection>().is_err());
    }
}

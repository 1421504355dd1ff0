//! Sort orders for statistic listings.

use super::snapshot::StatRecord;
use std::cmp::Ordering;
use std::str::FromStr;

/// How sibling records are ordered in a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Largest deep value first
    #[default]
    DeepValue,
    /// Largest own value first
    OwnValue,
    /// Most calls first
    Calls,
    /// Largest deep value per call first
    DeepPerCall,
    /// Largest own value per call first
    OwnPerCall,
    /// Alphabetical by regular name
    Name,
}

impl SortKey {
    pub fn compare(self, a: &StatRecord, b: &StatRecord) -> Ordering {
        let ordering = match self {
            SortKey::DeepValue => b.deep_value().cmp(&a.deep_value()),
            SortKey::OwnValue => b.own_value.cmp(&a.own_value),
            SortKey::Calls => b.call_count.cmp(&a.call_count),
            SortKey::DeepPerCall => b.deep_per_call().total_cmp(&a.deep_per_call()),
            SortKey::OwnPerCall => b.own_per_call().total_cmp(&a.own_per_call()),
            SortKey::Name => a.site.regular_name().cmp(&b.site.regular_name()),
        };
        // Ties fall back to call-site order so listings are stable.
        ordering.then_with(|| a.site.cmp(&b.site))
    }

    /// Sibling records in this order
    pub fn sorted(self, records: &[StatRecord]) -> Vec<&StatRecord> {
        let mut sorted: Vec<&StatRecord> = records.iter().collect();
        sorted.sort_by(|a, b| self.compare(a, b));
        sorted
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deep" => Ok(SortKey::DeepValue),
            "own" => Ok(SortKey::OwnValue),
            "calls" => Ok(SortKey::Calls),
            "deep-per-call" => Ok(SortKey::DeepPerCall),
            "own-per-call" => Ok(SortKey::OwnPerCall),
            "name" => Ok(SortKey::Name),
            other => Err(format!(
                "unknown sort key '{}' (expected deep, own, calls, deep-per-call, own-per-call or name)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CallSite;

    fn record(name: &str, calls: u64, own: u64) -> StatRecord {
        StatRecord {
            site: CallSite::named(name),
            call_count: calls,
            own_value: own,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_sort_orders() {
        let records = vec![record("b", 1, 50), record("a", 10, 20), record("c", 2, 80)];

        let names = |key: SortKey| -> Vec<String> {
            key.sorted(&records)
                .iter()
                .map(|r| r.site.name.to_string())
                .collect()
        };

        assert_eq!(names(SortKey::DeepValue), ["c", "b", "a"]);
        assert_eq!(names(SortKey::Calls), ["a", "c", "b"]);
        assert_eq!(names(SortKey::OwnPerCall), ["b", "c", "a"]);
        assert_eq!(names(SortKey::Name), ["a", "b", "c"]);
    }

    #[test]
    fn test_parse_sort_key() {
        assert_eq!("own".parse::<SortKey>(), Ok(SortKey::OwnValue));
        assert_eq!("deep-per-call".parse::<SortKey>(), Ok(SortKey::DeepPerCall));
        assert!("fastest".parse::<SortKey>().is_err());
    }
}

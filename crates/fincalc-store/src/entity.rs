//! Per-entity cached fact sets with TTL-based invalidation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fincalc_core::{ConceptId, Fact};

/// Cache entry with timestamp for TTL-based invalidation.
#[derive(Debug, Clone)]
struct CacheEntry {
    facts: Arc<Vec<Fact>>,
    cached_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(facts: Arc<Vec<Fact>>) -> Self {
        Self {
            facts,
            cached_at: Utc::now(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age > chrono::TimeDelta::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// All cached facts for one entity, keyed by concept.
///
/// Raw regulatory facts rarely change, so entries live for hours by default,
/// but the owner can invalidate them at any time.
#[derive(Debug, Default)]
pub(crate) struct EntityCache {
    concepts: HashMap<ConceptId, CacheEntry>,
}

impl EntityCache {
    /// Returns the cached fact set for a concept if present and fresh.
    pub(crate) fn get(&self, concept: &ConceptId, ttl: Duration) -> Option<Arc<Vec<Fact>>> {
        self.concepts
            .get(concept)
            .filter(|entry| !entry.is_stale(ttl))
            .map(|entry| Arc::clone(&entry.facts))
    }

    /// Stores the full fact set for a concept, replacing any stale entry.
    pub(crate) fn insert(&mut self, concept: ConceptId, facts: Arc<Vec<Fact>>) {
        self.concepts.insert(concept, CacheEntry::new(facts));
    }

    /// Drops entries older than the TTL; returns how many were removed.
    pub(crate) fn invalidate_stale(&mut self, ttl: Duration) -> usize {
        let before = self.concepts.len();
        self.concepts.retain(|_, entry| !entry.is_stale(ttl));
        before - self.concepts.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fincalc_core::{FilingRef, PeriodKey};

    fn fact(concept: &str) -> Fact {
        Fact {
            concept: ConceptId::new(concept),
            value: 1.0,
            unit: "USD".to_string(),
            currency: "USD".to_string(),
            period: PeriodKey::annual(2024, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()),
            filing_ref: FilingRef::new("acc-1"),
            source_adapter: "test".to_string(),
        }
    }

    #[test]
    fn fresh_entries_hit_and_zero_ttl_misses() {
        let mut cache = EntityCache::default();
        let concept = ConceptId::new("Revenues");
        cache.insert(concept.clone(), Arc::new(vec![fact("Revenues")]));

        assert!(cache.get(&concept, Duration::from_secs(3600)).is_some());
        assert!(cache.get(&concept, Duration::ZERO).is_none());
    }

    #[test]
    fn invalidate_stale_removes_expired_entries() {
        let mut cache = EntityCache::default();
        cache.insert(ConceptId::new("Revenues"), Arc::new(vec![fact("Revenues")]));
        cache.insert(ConceptId::new("Assets"), Arc::new(vec![fact("Assets")]));

        assert_eq!(cache.invalidate_stale(Duration::from_secs(3600)), 0);
        assert_eq!(cache.invalidate_stale(Duration::ZERO), 2);
        assert!(cache.is_empty());
    }
}

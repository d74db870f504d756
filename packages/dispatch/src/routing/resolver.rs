//! Distribution-mode resolution: cache, ordered filters, traits, default.

use std::sync::Arc;

use herald_core::{DistributionMode, Event, EventKey, RoutingFilter};
use tracing::debug;

use super::cache::RoutingCache;
use super::traits_registry::MessageTraitsRegistry;

/// Where a routing decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    Cached(DistributionMode),
    Filter(DistributionMode),
    Traits(DistributionMode),
    Default(DistributionMode),
}

impl RoutingDecision {
    #[must_use]
    pub fn mode(self) -> DistributionMode {
        match self {
            Self::Cached(mode) | Self::Filter(mode) | Self::Traits(mode) | Self::Default(mode) => {
                mode
            }
        }
    }

    fn source(self) -> &'static str {
        match self {
            Self::Cached(_) => "cache",
            Self::Filter(_) => "filter",
            Self::Traits(_) => "traits",
            Self::Default(_) => "default",
        }
    }
}

/// Resolves the distribution mode of an event type.
///
/// Resolution order:
/// 1. cached decision for the type
/// 2. filters in ascending `order` (stable for equal orders); first `Some` wins
/// 3. registered `MessageTraits` for the type
/// 4. the configured default
///
/// Steps 2-4 cache their result, so filters see at most the first event of
/// each type.
pub struct RoutingResolver {
    cache: RoutingCache,
    filters: Vec<Arc<dyn RoutingFilter>>,
    traits: Arc<MessageTraitsRegistry>,
    default_mode: DistributionMode,
}

impl RoutingResolver {
    #[must_use]
    pub fn new(
        mut filters: Vec<Arc<dyn RoutingFilter>>,
        traits: Arc<MessageTraitsRegistry>,
        default_mode: DistributionMode,
    ) -> Self {
        filters.sort_by_key(|filter| filter.order());
        Self {
            cache: RoutingCache::new(),
            filters,
            traits,
            default_mode,
        }
    }

    /// Resolve the mode for `event`, whose runtime type is `key`.
    ///
    /// A panicking filter propagates; it is not treated as "no decision".
    pub fn resolve(&self, key: EventKey, event: &dyn Event) -> DistributionMode {
        self.resolve_decision(key, event).mode()
    }

    /// Like [`resolve`](Self::resolve) but reports the decision source.
    pub fn resolve_decision(&self, key: EventKey, event: &dyn Event) -> RoutingDecision {
        if let Some(mode) = self.cache.get(key.type_id) {
            return RoutingDecision::Cached(mode);
        }

        let decision = self
            .filters
            .iter()
            .find_map(|filter| filter.decide(event))
            .map(RoutingDecision::Filter)
            .or_else(|| {
                self.traits
                    .get_by_key(key)
                    .map(|traits| RoutingDecision::Traits(traits.distribution_mode))
            })
            .unwrap_or(RoutingDecision::Default(self.default_mode));

        self.cache.insert(key.type_id, decision.mode());
        debug!(
            event_type = key.name,
            mode = %decision.mode(),
            source = decision.source(),
            "routing decision cached"
        );
        decision
    }

    #[must_use]
    pub fn cache(&self) -> &RoutingCache {
        &self.cache
    }

    #[must_use]
    pub fn default_mode(&self) -> DistributionMode {
        self.default_mode
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use herald_core::MessageTraits;
    use uuid::Uuid;

    use super::*;

    #[derive(Debug)]
    struct CartUpdated(Uuid);

    impl Event for CartUpdated {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    #[derive(Debug)]
    struct CartAbandoned(Uuid);

    impl Event for CartAbandoned {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    /// Filter returning a fixed decision and counting invocations.
    struct FixedFilter {
        order: i32,
        decision: Option<DistributionMode>,
        calls: Arc<AtomicU32>,
    }

    impl FixedFilter {
        fn new(
            order: i32,
            decision: Option<DistributionMode>,
        ) -> (Arc<dyn RoutingFilter>, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            let filter: Arc<dyn RoutingFilter> = Arc::new(Self {
                order,
                decision,
                calls: calls.clone(),
            });
            (filter, calls)
        }
    }

    impl RoutingFilter for FixedFilter {
        fn order(&self) -> i32 {
            self.order
        }

        fn decide(&self, _event: &dyn Event) -> Option<DistributionMode> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.decision
        }
    }

    fn event() -> CartUpdated {
        CartUpdated(Uuid::new_v4())
    }

    #[test]
    fn first_deciding_filter_in_order_wins() {
        // Registered out of order on purpose.
        let (late, late_calls) = FixedFilter::new(30, Some(DistributionMode::LocalOnly));
        let (undecided, undecided_calls) = FixedFilter::new(10, None);
        let (winner, winner_calls) = FixedFilter::new(20, Some(DistributionMode::Hybrid));

        let resolver = RoutingResolver::new(
            vec![late, undecided, winner],
            Arc::new(MessageTraitsRegistry::new()),
            DistributionMode::LocalOnly,
        );

        let e = event();
        let decision = resolver.resolve_decision(e.event_key(), &e);
        assert_eq!(decision, RoutingDecision::Filter(DistributionMode::Hybrid));
        assert_eq!(undecided_calls.load(Ordering::SeqCst), 1);
        assert_eq!(winner_calls.load(Ordering::SeqCst), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn traits_decide_when_no_filter_does() {
        let (undecided, _) = FixedFilter::new(0, None);
        let traits = Arc::new(MessageTraitsRegistry::new());
        traits.register::<CartUpdated>(MessageTraits::new(DistributionMode::ExternalOnly));

        let resolver = RoutingResolver::new(vec![undecided], traits, DistributionMode::LocalOnly);

        let e = event();
        assert_eq!(
            resolver.resolve_decision(e.event_key(), &e),
            RoutingDecision::Traits(DistributionMode::ExternalOnly)
        );
    }

    #[test]
    fn default_applies_without_filter_or_traits() {
        let resolver = RoutingResolver::new(
            Vec::new(),
            Arc::new(MessageTraitsRegistry::new()),
            DistributionMode::Hybrid,
        );

        let e = event();
        assert_eq!(
            resolver.resolve_decision(e.event_key(), &e),
            RoutingDecision::Default(DistributionMode::Hybrid)
        );
    }

    #[test]
    fn decision_is_cached_per_type() {
        let (filter, calls) = FixedFilter::new(0, Some(DistributionMode::ExternalOnly));
        let resolver = RoutingResolver::new(
            vec![filter],
            Arc::new(MessageTraitsRegistry::new()),
            DistributionMode::LocalOnly,
        );

        for _ in 0..10 {
            let e = event();
            assert_eq!(resolver.resolve(e.event_key(), &e), DistributionMode::ExternalOnly);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let e = event();
        assert!(matches!(
            resolver.resolve_decision(e.event_key(), &e),
            RoutingDecision::Cached(DistributionMode::ExternalOnly)
        ));

        // A different type is resolved independently.
        let other = CartAbandoned(Uuid::new_v4());
        resolver.resolve(other.event_key(), &other);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cache().len(), 2);
    }

    #[test]
    #[should_panic(expected = "filter exploded")]
    fn panicking_filter_propagates() {
        struct ExplodingFilter;

        impl RoutingFilter for ExplodingFilter {
            fn order(&self) -> i32 {
                0
            }

            fn decide(&self, _event: &dyn Event) -> Option<DistributionMode> {
                panic!("filter exploded");
            }
        }

        let filter: Arc<dyn RoutingFilter> = Arc::new(ExplodingFilter);
        let resolver = RoutingResolver::new(
            vec![filter],
            Arc::new(MessageTraitsRegistry::new()),
            DistributionMode::LocalOnly,
        );
        let e = event();
        resolver.resolve(e.event_key(), &e);
    }
}

// =============================================================================
// resolve.rs — THE ORCHESTRATOR OF LAST RESORTS
// =============================================================================
//
// One case identifier goes in. Four providers stand ready. This module
// decides who gets asked, in what order, and what happens when they fail —
// which they will, because every one of them fronts a government server
// with the uptime characteristics of a ceiling fan in a thunderstorm.
//
// The service is an explicit value constructed once at startup with its
// providers injected. No global singletons, no hidden state: if you want
// to test the orchestration, you hand it four fakes and watch it conduct.
//
// STATUS RESOLUTION is strictly priority-ordered, first non-null wins, no
// merging of partial results:
//   1. the provider matching the case's court category,
//   2. CNR registry-number lookup on every registry-capable provider
//      (when the identifier carries a CNR),
//   3. the aggregator API as the paid last resort.
// A provider that THROWS is logged and treated as if it answered None —
// one portal's bad afternoon never cancels the whole lookup.
//
// PARTY SEARCH is a policy-governed waterfall (see SearchPolicy): official
// sources first with a public-search fallback, or public-search first with
// a short-circuit. When results from several providers are merged, we dedup
// by case-insensitive title prefix so the same case doesn't appear twice
// wearing two providers' name tags.
// =============================================================================

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SearchPolicy;
use crate::models::{
    CaseIdentifier, CaseSnapshot, CourtCategory, SearchQuery, SearchResult,
};
use crate::providers::{CourtProvider, ProviderError};

/// The provider orchestra, wired once at startup.
pub struct CourtResolutionService {
    supreme: Arc<dyn CourtProvider>,
    ecourts: Arc<dyn CourtProvider>,
    aggregator: Arc<dyn CourtProvider>,
    public_search: Arc<dyn CourtProvider>,
    search_policy: SearchPolicy,
}

impl CourtResolutionService {
    pub fn new(
        supreme: Arc<dyn CourtProvider>,
        ecourts: Arc<dyn CourtProvider>,
        aggregator: Arc<dyn CourtProvider>,
        public_search: Arc<dyn CourtProvider>,
        search_policy: SearchPolicy,
    ) -> Self {
        Self {
            supreme,
            ecourts,
            aggregator,
            public_search,
            search_policy,
        }
    }

    /// Resolve a case's current status. None means every applicable
    /// provider either answered "no such case" or fell over trying —
    /// indistinguishable outcomes on purpose; the pipeline treats both as
    /// "try again next cycle".
    pub async fn resolve_status(&self, identifier: &CaseIdentifier) -> Option<CaseSnapshot> {
        if !identifier.is_addressable() {
            warn!(case = %identifier, "resolve: identifier is not addressable — skipping");
            return None;
        }

        let has_triple = !identifier.case_number.trim().is_empty();

        // 1. Category-matched provider, by (type, number, year).
        if has_triple {
            let primary = self.primary_for(identifier.category);
            if let Some(snapshot) = self.try_status(primary.as_ref(), identifier).await {
                return Some(snapshot);
            }
        }

        // 2. CNR lookup on every provider that declares the capability.
        //    The descriptor flag is the contract — nobody gets called on
        //    the off chance they secretly support it.
        if let Some(cnr) = identifier.cnr.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            for provider in [&self.ecourts, &self.aggregator, &self.supreme, &self.public_search] {
                if !provider.descriptor().supports_registry_lookup {
                    continue;
                }
                if let Some(snapshot) = self.try_cnr(provider.as_ref(), cnr).await {
                    return Some(snapshot);
                }
            }
        }

        // 3. The aggregator API, by triple. Paid, so it goes last.
        if has_triple {
            if let Some(snapshot) = self.try_status(self.aggregator.as_ref(), identifier).await {
                return Some(snapshot);
            }
        }

        debug!(case = %identifier, "resolve: every provider came up empty");
        None
    }

    /// Party-name search, waterfall per the configured policy.
    pub async fn search_by_party(&self, query: &SearchQuery) -> Vec<SearchResult> {
        match self.search_policy {
            SearchPolicy::OfficialFirst => {
                let official = self.search_official(query).await;
                if !official.is_empty() {
                    return official;
                }
                info!(
                    party = %query.party_name,
                    "search: official sources returned nothing — falling back to public search"
                );
                self.try_search(self.public_search.as_ref(), query).await
            }
            SearchPolicy::PublicFirst => {
                // The free engine costs nothing and answers fast. Any
                // non-empty result short-circuits before a single CAPTCHA
                // gets negotiated.
                let public = self.try_search(self.public_search.as_ref(), query).await;
                if !public.is_empty() {
                    return public;
                }
                self.search_official(query).await
            }
        }
    }

    /// The official-source half of the waterfall: Supreme Court then
    /// eCourts, honoring a category filter, merged + deduped.
    async fn search_official(&self, query: &SearchQuery) -> Vec<SearchResult> {
        let mut batches: Vec<Vec<SearchResult>> = Vec::new();

        let want_supreme = matches!(query.category, None | Some(CourtCategory::SupremeCourt));
        let want_ecourts = !matches!(query.category, Some(CourtCategory::SupremeCourt));

        if want_supreme {
            batches.push(self.try_search(self.supreme.as_ref(), query).await);
        }
        if want_ecourts {
            batches.push(self.try_search(self.ecourts.as_ref(), query).await);
        }

        merge_deduped(batches)
    }

    fn primary_for(&self, category: CourtCategory) -> &Arc<dyn CourtProvider> {
        match category {
            CourtCategory::SupremeCourt => &self.supreme,
            _ => &self.ecourts,
        }
    }

    /// One provider's status lookup, failure-isolated: Err becomes None
    /// with a log line, never a propagated error.
    async fn try_status(
        &self,
        provider: &dyn CourtProvider,
        identifier: &CaseIdentifier,
    ) -> Option<CaseSnapshot> {
        let descriptor = provider.descriptor();
        if !descriptor.supports_status_lookup {
            return None;
        }
        match provider.get_status(identifier).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log_provider_failure(descriptor.kind.to_string().as_str(), &e);
                None
            }
        }
    }

    async fn try_cnr(&self, provider: &dyn CourtProvider, cnr: &str) -> Option<CaseSnapshot> {
        let descriptor = provider.descriptor();
        match provider.get_status_by_cnr(cnr).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log_provider_failure(descriptor.kind.to_string().as_str(), &e);
                None
            }
        }
    }

    async fn try_search(
        &self,
        provider: &dyn CourtProvider,
        query: &SearchQuery,
    ) -> Vec<SearchResult> {
        let descriptor = provider.descriptor();
        match provider.search_by_party(query).await {
            Ok(results) => {
                debug!(
                    provider = %descriptor.kind,
                    count = results.len(),
                    party = %query.party_name,
                    "search: provider answered"
                );
                results
            }
            Err(e) => {
                log_provider_failure(descriptor.kind.to_string().as_str(), &e);
                Vec::new()
            }
        }
    }
}

fn log_provider_failure(provider: &str, error: &ProviderError) {
    match error {
        ProviderError::SolverUnavailable => {
            debug!(provider = provider, "provider sidelined: CAPTCHA solver unavailable");
        }
        _ => {
            warn!(provider = provider, error = %error, "provider failed — continuing down the chain");
        }
    }
}

/// Merge result batches in provider-priority order, dropping later results
/// whose title prefix matches one already kept. Same case, two providers,
/// one row.
fn merge_deduped(batches: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    let mut seen: Vec<String> = Vec::new();
    let mut merged = Vec::new();
    for batch in batches {
        for result in batch {
            let key = result.title_prefix_key();
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            merged.push(result);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;
    use crate::providers::ProviderDescriptor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A scripted provider: fixed answers, call counters, optional failure.
    struct FakeProvider {
        kind: ProviderKind,
        registry: bool,
        status_lookup: bool,
        fail_status: bool,
        status_answer: Option<CaseSnapshot>,
        cnr_answer: Option<CaseSnapshot>,
        search_answer: Vec<SearchResult>,
        status_calls: AtomicU32,
        cnr_calls: AtomicU32,
        search_calls: AtomicU32,
    }

    impl FakeProvider {
        fn new(kind: ProviderKind) -> Self {
            Self {
                kind,
                registry: false,
                status_lookup: true,
                fail_status: false,
                status_answer: None,
                cnr_answer: None,
                search_answer: Vec::new(),
                status_calls: AtomicU32::new(0),
                cnr_calls: AtomicU32::new(0),
                search_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CourtProvider for FakeProvider {
        fn descriptor(&self) -> ProviderDescriptor {
            ProviderDescriptor {
                kind: self.kind,
                supports_registry_lookup: self.registry,
                supports_status_lookup: self.status_lookup,
            }
        }

        async fn search_by_party(
            &self,
            _query: &SearchQuery,
        ) -> Result<Vec<SearchResult>, ProviderError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.search_answer.clone())
        }

        async fn get_status(
            &self,
            _identifier: &CaseIdentifier,
        ) -> Result<Option<CaseSnapshot>, ProviderError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_status {
                return Err(ProviderError::Transport("portal exploded".into()));
            }
            Ok(self.status_answer.clone())
        }

        async fn get_status_by_cnr(
            &self,
            _cnr: &str,
        ) -> Result<Option<CaseSnapshot>, ProviderError> {
            self.cnr_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.cnr_answer.clone())
        }
    }

    fn identifier(category: CourtCategory, cnr: Option<&str>) -> CaseIdentifier {
        CaseIdentifier {
            category,
            case_type: "O.S.".into(),
            type_code: None,
            case_number: "142".into(),
            case_year: "2023".into(),
            cnr: cnr.map(str::to_string),
            court_code: None,
            state_code: None,
            district_code: None,
        }
    }

    fn snapshot(status: &str) -> CaseSnapshot {
        let mut snap = CaseSnapshot::empty();
        snap.title = "Ravi Kumar vs State".into();
        snap.status = status.into();
        snap
    }

    fn result(title: &str, category: CourtCategory, source: ProviderKind) -> SearchResult {
        SearchResult {
            title: title.into(),
            case_number: None,
            case_year: None,
            case_type: None,
            category,
            court_name: None,
            court_code: None,
            cnr: None,
            status: None,
            petitioner: None,
            respondent: None,
            source,
        }
    }

    fn service(
        supreme: FakeProvider,
        ecourts: FakeProvider,
        aggregator: FakeProvider,
        public: FakeProvider,
        policy: SearchPolicy,
    ) -> (
        CourtResolutionService,
        Arc<FakeProvider>,
        Arc<FakeProvider>,
        Arc<FakeProvider>,
        Arc<FakeProvider>,
    ) {
        let supreme = Arc::new(supreme);
        let ecourts = Arc::new(ecourts);
        let aggregator = Arc::new(aggregator);
        let public = Arc::new(public);
        let svc = CourtResolutionService::new(
            supreme.clone(),
            ecourts.clone(),
            aggregator.clone(),
            public.clone(),
            policy,
        );
        (svc, supreme, ecourts, aggregator, public)
    }

    #[tokio::test]
    async fn primary_failure_falls_through_to_aggregator() {
        let mut ecourts = FakeProvider::new(ProviderKind::Ecourts);
        ecourts.fail_status = true;
        let mut aggregator = FakeProvider::new(ProviderKind::AggregatorApi);
        aggregator.status_answer = Some(snapshot("Disposed"));

        let (svc, _s, ecourts, aggregator, _p) = service(
            FakeProvider::new(ProviderKind::SupremeCourt),
            ecourts,
            aggregator,
            FakeProvider::new(ProviderKind::PublicSearch),
            SearchPolicy::OfficialFirst,
        );

        let resolved = svc
            .resolve_status(&identifier(CourtCategory::DistrictCourt, None))
            .await;
        // The primary threw; the secondary's snapshot still came back,
        // and nothing was raised to us.
        assert_eq!(resolved.unwrap().status, "Disposed");
        assert_eq!(ecourts.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(aggregator.status_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn supreme_court_category_routes_to_supreme_provider() {
        let mut supreme = FakeProvider::new(ProviderKind::SupremeCourt);
        supreme.status_answer = Some(snapshot("Pending"));

        let (svc, supreme, ecourts, _a, _p) = service(
            supreme,
            FakeProvider::new(ProviderKind::Ecourts),
            FakeProvider::new(ProviderKind::AggregatorApi),
            FakeProvider::new(ProviderKind::PublicSearch),
            SearchPolicy::OfficialFirst,
        );

        let resolved = svc
            .resolve_status(&identifier(CourtCategory::SupremeCourt, None))
            .await;
        assert!(resolved.is_some());
        assert_eq!(supreme.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ecourts.status_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cnr_fallback_respects_capability_flags() {
        let mut ecourts = FakeProvider::new(ProviderKind::Ecourts);
        ecourts.registry = true;
        ecourts.cnr_answer = Some(snapshot("Pending"));
        // Supreme court declares no registry capability; it must never be
        // asked, even though its fake would happily answer.
        let supreme = FakeProvider::new(ProviderKind::SupremeCourt);

        let (svc, supreme, ecourts, _a, _p) = service(
            supreme,
            ecourts,
            FakeProvider::new(ProviderKind::AggregatorApi),
            FakeProvider::new(ProviderKind::PublicSearch),
            SearchPolicy::OfficialFirst,
        );

        let resolved = svc
            .resolve_status(&identifier(
                CourtCategory::DistrictCourt,
                Some("KLER010012342023"),
            ))
            .await;
        assert!(resolved.is_some());
        assert_eq!(ecourts.cnr_calls.load(Ordering::SeqCst), 1);
        assert_eq!(supreme.cnr_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nothing_anywhere_is_none() {
        let (svc, ..) = service(
            FakeProvider::new(ProviderKind::SupremeCourt),
            FakeProvider::new(ProviderKind::Ecourts),
            FakeProvider::new(ProviderKind::AggregatorApi),
            FakeProvider::new(ProviderKind::PublicSearch),
            SearchPolicy::OfficialFirst,
        );
        assert!(svc
            .resolve_status(&identifier(CourtCategory::DistrictCourt, None))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn official_first_falls_back_to_public_on_zero_results() {
        let mut public = FakeProvider::new(ProviderKind::PublicSearch);
        public.search_answer = vec![result(
            "Ravi Kumar vs Sessions Court Ernakulam",
            CourtCategory::DistrictCourt,
            ProviderKind::PublicSearch,
        )];

        let (svc, supreme, ecourts, _a, public) = service(
            FakeProvider::new(ProviderKind::SupremeCourt),
            FakeProvider::new(ProviderKind::Ecourts),
            FakeProvider::new(ProviderKind::AggregatorApi),
            public,
            SearchPolicy::OfficialFirst,
        );

        let results = svc
            .search_by_party(&SearchQuery {
                party_name: "Ravi Kumar".into(),
                ..Default::default()
            })
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].category, CourtCategory::DistrictCourt);
        assert_eq!(results[0].source, ProviderKind::PublicSearch);
        // Officials were consulted first and came up dry.
        assert_eq!(supreme.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ecourts.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(public.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn public_first_short_circuits_before_official_sources() {
        let mut public = FakeProvider::new(ProviderKind::PublicSearch);
        public.search_answer = vec![result(
            "Ravi Kumar vs State",
            CourtCategory::HighCourt,
            ProviderKind::PublicSearch,
        )];

        let (svc, supreme, ecourts, _a, public) = service(
            FakeProvider::new(ProviderKind::SupremeCourt),
            FakeProvider::new(ProviderKind::Ecourts),
            FakeProvider::new(ProviderKind::AggregatorApi),
            public,
            SearchPolicy::PublicFirst,
        );

        let results = svc
            .search_by_party(&SearchQuery {
                party_name: "Ravi Kumar".into(),
                ..Default::default()
            })
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(public.search_calls.load(Ordering::SeqCst), 1);
        // Short-circuit: the CAPTCHA-gated portals were never touched.
        assert_eq!(supreme.search_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ecourts.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn category_filter_skips_the_wrong_official_provider() {
        let mut supreme = FakeProvider::new(ProviderKind::SupremeCourt);
        supreme.search_answer = vec![result(
            "Ravi Kumar vs Union of India",
            CourtCategory::SupremeCourt,
            ProviderKind::SupremeCourt,
        )];

        let (svc, supreme, ecourts, ..) = service(
            supreme,
            FakeProvider::new(ProviderKind::Ecourts),
            FakeProvider::new(ProviderKind::AggregatorApi),
            FakeProvider::new(ProviderKind::PublicSearch),
            SearchPolicy::OfficialFirst,
        );

        let results = svc
            .search_by_party(&SearchQuery {
                party_name: "Ravi Kumar".into(),
                category: Some(CourtCategory::SupremeCourt),
                ..Default::default()
            })
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(supreme.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ecourts.search_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn merge_dedups_by_title_prefix() {
        let a = result(
            "Ravi Kumar vs State of Kerala and Others",
            CourtCategory::HighCourt,
            ProviderKind::SupremeCourt,
        );
        let b = result(
            "RAVI KUMAR VS STATE OF KERALA & Ors",
            CourtCategory::HighCourt,
            ProviderKind::Ecourts,
        );
        let c = result(
            "Entirely Different Case vs Someone",
            CourtCategory::DistrictCourt,
            ProviderKind::Ecourts,
        );
        let merged = merge_deduped(vec![vec![a], vec![b, c]]);
        assert_eq!(merged.len(), 2);
        // Earlier provider's rendition of the duplicate wins.
        assert_eq!(merged[0].source, ProviderKind::SupremeCourt);
    }
}

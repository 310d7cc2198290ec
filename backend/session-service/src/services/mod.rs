pub mod admission;
pub mod membership;
pub mod monetization;
pub mod resources;

pub use admission::AdmissionController;
pub use membership::{history, MembershipLedger, StoreMembershipLedger};
pub use monetization::MonetizationLedger;
pub use resources::{CreateResource, ResourceService};

use crate::config::SessionConfig;
use session_cache::SessionCache;
use session_store::Store;
use std::sync::Arc;

/// Every service component, wired over one store and one cache
#[derive(Clone)]
pub struct Services {
    pub resources: ResourceService,
    pub admission: AdmissionController,
    pub membership: Arc<dyn MembershipLedger>,
    pub monetization: MonetizationLedger,
}

impl Services {
    pub fn new(store: Store, cache: SessionCache, session: &SessionConfig) -> Self {
        let membership: Arc<dyn MembershipLedger> =
            Arc::new(StoreMembershipLedger::new(store.clone(), cache.clone()));
        Self::with_ledger(store, cache, session, membership)
    }

    /// Same wiring with a caller-supplied membership ledger
    pub fn with_ledger(
        store: Store,
        cache: SessionCache,
        session: &SessionConfig,
        membership: Arc<dyn MembershipLedger>,
    ) -> Self {
        let resources = ResourceService::new(
            store.clone(),
            cache.clone(),
            session.default_capacity,
            session.cache_ttl_secs,
        );
        let admission = AdmissionController::new(store.clone(), cache.clone(), membership.clone());
        let monetization = MonetizationLedger::new(store, cache, resources.clone());

        Self {
            resources,
            admission,
            membership,
            monetization,
        }
    }
}

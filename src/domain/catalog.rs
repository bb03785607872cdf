use {
    super::money::Money,
    std::collections::HashMap,
    uuid::Uuid,
};

/// Priced content item and its owner.
#[derive(Debug, Clone)]
pub struct Listing {
    pub owner_id: Uuid,
    pub price: Money,
}

/// Subscription plan. `share_creator` names the beneficiary for
/// creator-level plans; platform plans leave it unset and produce no
/// income entry.
#[derive(Debug, Clone)]
pub struct Plan {
    pub plan_id: Uuid,
    pub period_days: i64,
    pub price: Money,
    pub share_creator: Option<Uuid>,
    /// Provider product id this plan is sold under in in-app stores.
    pub product_id: Option<String>,
}

/// Content/creator lookup collaborator. The rest of the platform owns the
/// actual catalog; the payment core only reads prices and owners through
/// this seam.
pub trait Catalog: Send + Sync {
    fn content(&self, related_id: &Uuid) -> Option<Listing>;
    fn plan(&self, plan_id: &Uuid) -> Option<Plan>;
    fn plan_by_product(&self, product_id: &str) -> Option<Plan>;
}

/// Fixed catalog loaded at startup. Enough for the payment core; the
/// platform swaps in its own implementation.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    listings: HashMap<Uuid, Listing>,
    plans: HashMap<Uuid, Plan>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, content_id: Uuid, listing: Listing) -> Self {
        self.listings.insert(content_id, listing);
        self
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plans.insert(plan.plan_id, plan);
        self
    }
}

impl Catalog for StaticCatalog {
    fn content(&self, related_id: &Uuid) -> Option<Listing> {
        self.listings.get(related_id).cloned()
    }

    fn plan(&self, plan_id: &Uuid) -> Option<Plan> {
        self.plans.get(plan_id).cloned()
    }

    fn plan_by_product(&self, product_id: &str) -> Option<Plan> {
        self.plans
            .values()
            .find(|p| p.product_id.as_deref() == Some(product_id))
            .cloned()
    }
}

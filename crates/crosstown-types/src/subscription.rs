use crate::filter::Filter;

/// Per-connection subscription: a subscription id plus the filters that were
/// registered for it. Owned exclusively by the connection that created it.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub connection_id: String,
    pub subscription_id: String,
    pub filters: Vec<Filter>,
}

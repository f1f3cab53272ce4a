use crate::models::{NodeSchema, Properties, PropertyRef};

/// The sub resource every Azure node is scoped to. Stale subscriptions are never cleaned up.
pub fn subscription_schema() -> NodeSchema {
    NodeSchema::new(
        "AzureSubscriptionSchema",
        module_path!(),
        "AzureSubscription",
        Properties::from([
            ("id", PropertyRef::new("id")),
            ("name", PropertyRef::new("name")),
            ("tenant_id", PropertyRef::new("tenant_id")),
            ("state", PropertyRef::new("state")),
            ("lastupdated", PropertyRef::kwarg("lastupdated")),
        ]),
    )
}

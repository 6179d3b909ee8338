use serde::Deserialize;

/// Parsed shape of a provider webhook body. Real providers wrap more fields;
/// this is the subset `ProcessWebhook`'s dispatch needs.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub webhook_event_id: String,
    pub event_type: String,
    pub intent_id: String,
}

pub const EVENT_INTENT_SUCCEEDED: &str = "intent.succeeded";
pub const EVENT_INTENT_FAILED: &str = "intent.failed";
pub const EVENT_CHARGE_REFUNDED: &str = "charge.refunded";

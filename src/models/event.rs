use serde::Deserialize;

fn default_count() -> i64 {
    1
}

/// First-party tracker callback. `id` is the internal email id, sent as a
/// string; a missing count means one occurrence.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerEvent {
    pub event: String,
    pub id: String,
    #[serde(default = "default_count")]
    pub count: i64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Delivery-provider webhook record. `sg_message_id` carries routing noise
/// after the first '.'; only the prefix correlates with what we stored at
/// send time.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub event: String,
    #[serde(default)]
    pub sg_message_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_count_defaults_to_one() {
        let ev: TrackerEvent =
            serde_json::from_str(r#"{"event":"open","id":"42"}"#).unwrap();
        assert_eq!(ev.count, 1);
        assert_eq!(ev.id, "42");

        let ev: TrackerEvent =
            serde_json::from_str(r#"{"event":"click","id":"7","count":3,"timestamp":1700000000}"#)
                .unwrap();
        assert_eq!(ev.count, 3);
        assert_eq!(ev.timestamp, Some(1700000000));
    }

    #[test]
    fn provider_event_tolerates_sparse_payloads() {
        let ev: ProviderEvent = serde_json::from_str(
            r#"{"event":"bounce","sg_message_id":"abc.def","email":"x@example.com","reason":"550 user unknown","unknown_field":true}"#,
        )
        .unwrap();
        assert_eq!(ev.sg_message_id.as_deref(), Some("abc.def"));
        assert_eq!(ev.reason.as_deref(), Some("550 user unknown"));

        let ev: ProviderEvent = serde_json::from_str(r#"{"event":"processed"}"#).unwrap();
        assert!(ev.sg_message_id.is_none());
    }
}

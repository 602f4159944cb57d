use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use tracing::{debug, warn};

use crate::models::email::{Email, EmailPatch};
use crate::services::collaborators::DeliveryNote;
use crate::AppState;

/// Cache key for the campaign an email belongs to. Emails sent the same day
/// under the same base subject share one key.
pub fn campaign_key(send_at: Option<i64>, created_at: i64, subject: &str) -> String {
    let epoch = send_at.unwrap_or(created_at);
    let date = DateTime::from_timestamp(epoch, 0)
        .unwrap_or_default()
        .date_naive();
    format!("campaign-stats:{}:{}", date, base_subject(subject))
}

fn base_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let lowered = s.to_ascii_lowercase();
        let stripped = ["re:", "fw:", "fwd:"]
            .iter()
            .find_map(|p| lowered.starts_with(p).then(|| s[p.len()..].trim_start()));
        match stripped {
            Some(rest) => s = rest,
            None => break,
        }
    }
    s.to_lowercase()
}

/// Side effects after a dispatch pass: drop the cached stats for every
/// touched campaign and resync the search index. Failures are logged and
/// swallowed, the sends already happened.
pub async fn after_dispatch(state: &AppState, sent: &[Email]) {
    let keys: BTreeSet<String> = sent
        .iter()
        .map(|e| campaign_key(e.send_at, e.created_at, &e.subject))
        .collect();
    invalidate(state, keys).await;

    let ids: Vec<i64> = sent.iter().map(|e| e.id).collect();
    resync(state, ids).await;
}

/// Side effects after webhook ingestion. Runs whether or not the batch
/// persisted cleanly: a stale cache entry is worse than a redundant flush.
pub async fn after_reconcile(
    state: &AppState,
    emails: &BTreeMap<i64, Email>,
    patches: &BTreeMap<i64, EmailPatch>,
    notes: &[(i64, DeliveryNote)],
) {
    let mut keys = BTreeSet::new();
    let mut ids = Vec::new();
    for (id, patch) in patches {
        if patch.is_empty() {
            continue;
        }
        if let Some(email) = emails.get(id) {
            keys.insert(campaign_key(email.send_at, email.created_at, &email.subject));
            ids.push(*id);
        }
    }
    invalidate(state, keys).await;

    for (user_id, note) in notes {
        if let Err(e) = state.collaborators.notifier.notify(*user_id, note).await {
            debug!(user_id, email_id = note.email_id, error = %e, "delivery note not published");
        }
    }

    resync(state, ids).await;
}

async fn invalidate(state: &AppState, keys: BTreeSet<String>) {
    if keys.is_empty() {
        return;
    }
    let keys: Vec<String> = keys.into_iter().collect();
    if let Err(e) = state.collaborators.cache.invalidate(&keys).await {
        warn!(count = keys.len(), error = %e, "stats cache invalidation failed");
    }
}

async fn resync(state: &AppState, ids: Vec<i64>) {
    if ids.is_empty() {
        return;
    }
    if let Err(e) = state.collaborators.indexer.resync(&ids).await {
        warn!(count = ids.len(), error = %e, "search resync failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_subject_strips_reply_prefixes() {
        assert_eq!(base_subject("Re: Fwd: Launch Brief"), "launch brief");
        assert_eq!(base_subject("FW: re:  pitch"), "pitch");
        assert_eq!(base_subject("Launch Brief"), "launch brief");
    }

    #[test]
    fn campaign_key_prefers_send_at_over_created_at() {
        // 2024-05-02 vs 2024-05-01
        let with_send = campaign_key(Some(1_714_651_200), 1_714_564_800, "Re: Pitch");
        let without = campaign_key(None, 1_714_564_800, "Pitch");
        assert_eq!(with_send, "campaign-stats:2024-05-02:pitch");
        assert_eq!(without, "campaign-stats:2024-05-01:pitch");
    }
}

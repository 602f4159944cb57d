use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db::{self, queries};
use crate::models::email::{DeliveryStage, Email, EmailPatch};
use crate::models::event::{ProviderEvent, TrackerEvent};
use crate::models::unsubscribe::NewUnsubscribe;
use crate::services::collaborators::{DeliveryNote, EventVerb};
use crate::services::fanout_service;
use crate::AppState;

/// Result of ingesting one webhook batch. `errors` lists every record that
/// could not be applied; the rest were applied regardless.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub applied: u32,
    pub errors: Vec<String>,
}

/// What we stored at send time is the full provider message id; what the
/// provider echoes back has routing noise appended after the first '.'.
pub(crate) fn correlation_prefix(raw: &str) -> &str {
    raw.split_once('.').map(|(prefix, _)| prefix).unwrap_or(raw)
}

/// Per-batch accumulator. Events fold into one patch per email so a batch
/// lands in a single transaction no matter how many records it carries.
#[derive(Default)]
struct Reconciliation {
    patches: BTreeMap<i64, EmailPatch>,
    emails: BTreeMap<i64, Email>,
    unsubscribes: Vec<NewUnsubscribe>,
    notes: Vec<(i64, DeliveryNote)>,
    errors: Vec<String>,
    applied: u32,
}

impl Reconciliation {
    async fn email_by_id(&mut self, state: &AppState, id: i64) -> Option<Email> {
        if !self.emails.contains_key(&id) {
            match queries::email_by_id(&state.pool, id).await {
                Ok(Some(email)) => {
                    self.emails.insert(id, email);
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!(email_id = id, error = %e, "email lookup failed");
                    return None;
                }
            }
        }
        self.emails.get(&id).cloned()
    }

    async fn email_by_provider_key(&mut self, state: &AppState, key: &str) -> Option<Email> {
        if let Some(email) = self
            .emails
            .values()
            .find(|e| e.provider_message_id.as_deref() == Some(key))
        {
            return Some(email.clone());
        }
        match queries::email_by_provider_key(&state.pool, key).await {
            Ok(Some(email)) => {
                let id = email.id;
                self.emails.insert(id, email);
                self.emails.get(&id).cloned()
            }
            Ok(None) => None,
            Err(e) => {
                warn!(provider_key = key, error = %e, "provider key lookup failed");
                None
            }
        }
    }

    fn patch_for(&mut self, id: i64) -> &mut EmailPatch {
        self.patches.entry(id).or_default()
    }

    fn note(&mut self, email: &Email, verb: EventVerb) {
        self.notes.push((
            email.created_by,
            DeliveryNote {
                email_id: email.id,
                verb,
                subject: email.subject.clone(),
                to_addr: email.to_addr.clone(),
            },
        ));
    }

    /// Persist everything in one transaction, then fan out. Fanout runs no
    /// matter how the write went: the cache must not serve stale counters
    /// for rows that may have changed.
    async fn finish(mut self, state: &AppState) -> IngestOutcome {
        let dirty = self.patches.values().any(|p| !p.is_empty()) || !self.unsubscribes.is_empty();
        if dirty {
            let write = tokio::time::timeout(
                Duration::from_secs(state.config.batch_write_timeout_secs),
                persist(&state.pool, &self.patches, &self.unsubscribes),
            )
            .await;
            match write {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.applied = 0;
                    self.errors.push(format!("batch write failed: {e:#}"));
                }
                Err(_) => {
                    self.applied = 0;
                    self.errors.push(format!(
                        "batch write timed out after {}s",
                        state.config.batch_write_timeout_secs
                    ));
                }
            }
        }

        fanout_service::after_reconcile(state, &self.emails, &self.patches, &self.notes).await;

        IngestOutcome {
            applied: self.applied,
            errors: self.errors,
        }
    }
}

async fn persist(
    pool: &SqlitePool,
    patches: &BTreeMap<i64, EmailPatch>,
    unsubscribes: &[NewUnsubscribe],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    let now = db::now_epoch();
    for (id, patch) in patches {
        if patch.is_empty() {
            continue;
        }
        queries::apply_patch(&mut *tx, *id, patch, now).await?;
    }
    for unsub in unsubscribes {
        queries::insert_unsubscribe(&mut *tx, unsub, now).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// First-party tracker batch: events carry our own email id as a string.
/// An id that does not parse or resolve fails that record only, as does a
/// negative count: the stored counters only ever grow.
pub async fn ingest_tracker_events(state: &AppState, events: Vec<TrackerEvent>) -> IngestOutcome {
    let mut recon = Reconciliation::default();

    for event in events {
        let id: i64 = match event.id.parse() {
            Ok(id) => id,
            Err(_) => {
                recon
                    .errors
                    .push(format!("tracker event has malformed id {:?}", event.id));
                continue;
            }
        };
        if event.count < 0 {
            recon.errors.push(format!(
                "tracker event has negative count {} for email {id}",
                event.count
            ));
            continue;
        }
        let Some(email) = recon.email_by_id(state, id).await else {
            recon.errors.push(format!("no email with id {id}"));
            continue;
        };

        match event.event.as_str() {
            "open" => {
                recon.patch_for(id).opened_add += event.count;
                recon.note(&email, EventVerb::Open);
            }
            "click" => {
                recon.patch_for(id).clicked_add += event.count;
                recon.note(&email, EventVerb::Click);
            }
            other => {
                recon
                    .errors
                    .push(format!("unknown tracker event {other:?} for email {id}"));
                continue;
            }
        }
        recon.applied += 1;
    }

    recon.finish(state).await
}

/// Provider batch: records correlate through the sg_message_id prefix. Only
/// event kinds we track mutate rows; the rest are acknowledged and skipped.
pub async fn ingest_provider_events(
    state: &AppState,
    events: Vec<ProviderEvent>,
) -> IngestOutcome {
    let mut recon = Reconciliation::default();

    for event in events {
        let Some(raw_key) = event.sg_message_id.as_deref().filter(|k| !k.is_empty()) else {
            recon
                .errors
                .push(format!("{} event without sg_message_id", event.event));
            continue;
        };
        let key = correlation_prefix(raw_key);
        let Some(email) = recon.email_by_provider_key(state, key).await else {
            recon
                .errors
                .push(format!("no email dispatched with message id {key:?}"));
            continue;
        };
        let id = email.id;

        match event.event.as_str() {
            "delivered" => match email.stage.advance(DeliveryStage::Delivered) {
                Ok(true) => recon.patch_for(id).mark_delivered = true,
                Ok(false) => {}
                Err(e) => {
                    recon.errors.push(format!("email {id}: {e}"));
                    continue;
                }
            },
            "open" => {
                recon.patch_for(id).provider_opened_add += 1;
                recon.note(&email, EventVerb::Open);
            }
            "bounce" => {
                let patch = recon.patch_for(id);
                patch.set_bounced = true;
                if patch.failure_reason.is_none() {
                    patch.failure_reason = event.reason.clone();
                }
                recon.note(&email, EventVerb::Bounce);
            }
            "dropped" => {
                let patch = recon.patch_for(id);
                patch.set_dropped = true;
                if patch.failure_reason.is_none() {
                    patch.failure_reason = event.reason.clone();
                }
            }
            "spamreport" => {
                recon.patch_for(id).set_spam = true;
                recon.note(&email, EventVerb::Spam);
            }
            "unsubscribe" => {
                let Some(addr) = event.email.as_deref().filter(|a| !a.is_empty()) else {
                    recon
                        .errors
                        .push(format!("unsubscribe for email {id} carries no address"));
                    continue;
                };
                recon.unsubscribes.push(NewUnsubscribe {
                    created_by: email.created_by,
                    list_id: email.list_id,
                    contact_id: email.contact_id,
                    email: addr.to_string(),
                });
            }
            other => {
                debug!(email_id = id, event = other, "ignoring untracked provider event");
                continue;
            }
        }
        recon.applied += 1;
    }

    recon.finish(state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_prefix_drops_routing_noise() {
        assert_eq!(correlation_prefix("abc123.recvd-65abc.0"), "abc123");
        assert_eq!(correlation_prefix("abc123"), "abc123");
        assert_eq!(correlation_prefix(".tail"), "");
    }
}

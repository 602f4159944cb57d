use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::{self, queries};
use crate::error::SendError;
use crate::models::email::Email;
use crate::models::user::{SendMethod, User};
use crate::providers::gmail::GmailMailer;
use crate::providers::outlook::OutlookMailer;
use crate::providers::sendgrid::SendgridMailer;
use crate::providers::smtp_relay::{SmtpCredentials, SmtpRelayMailer};
use crate::providers::{Address, AttachmentBlob, OutboundEmail, SendReceipt};
use crate::services::{fanout_service, token_service};
use crate::AppState;

/// Outcome of one dispatch pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PassStats {
    pub attempted: u32,
    pub sent: u32,
    pub failed: u32,
}

struct SendOutcome {
    receipt: SendReceipt,
    via: SendMethod,
}

/// One pass over every due email. Failures are per-email: they are logged,
/// recorded on the row and never stop the rest of the batch. Successful
/// sends are fanned out (stats cache, search index) at the end.
pub async fn run_pass(state: &AppState) -> Result<PassStats> {
    let now = db::now_epoch();
    let due = queries::due_emails(&state.pool, now)
        .await
        .context("loading due emails")?;
    if due.is_empty() {
        return Ok(PassStats::default());
    }
    info!(count = due.len(), "dispatching due emails");

    let mut stats = PassStats::default();
    let mut sent_emails: Vec<Email> = Vec::new();

    for email in due {
        stats.attempted += 1;
        let attachment_ids = email.attachment_id_list();

        match send_one(state, &email).await {
            Ok(outcome) => {
                // the provider accepted; if the success write fails the row
                // stays queued and the next pass re-sends
                match queries::mark_dispatched(&state.pool, email.id, outcome.via, &outcome.receipt)
                    .await
                {
                    Ok(()) => {
                        info!(
                            email_id = email.id,
                            via = outcome.via.as_str(),
                            "email dispatched"
                        );
                        stats.sent += 1;
                        sent_emails.push(email);
                    }
                    Err(e) => {
                        warn!(email_id = email.id, error = %e, "send accepted but not recorded");
                        if let Err(db_err) = queries::record_dispatch_failure(
                            &state.pool,
                            email.id,
                            &format!("send accepted but not recorded: {e}"),
                        )
                        .await
                        {
                            warn!(email_id = email.id, error = %db_err, "could not record dispatch failure");
                        }
                        stats.failed += 1;
                    }
                }
            }
            Err(e) => {
                warn!(email_id = email.id, error = %format!("{e:#}"), "dispatch failed");
                if let Err(db_err) =
                    queries::record_dispatch_failure(&state.pool, email.id, &format!("{e:#}")).await
                {
                    warn!(email_id = email.id, error = %db_err, "could not record dispatch failure");
                }
                stats.failed += 1;
            }
        }

        // files count as used after any attempt, success or not
        if !attachment_ids.is_empty() {
            if let Err(e) = queries::mark_files_imported(&state.pool, &attachment_ids).await {
                warn!(email_id_list = ?attachment_ids, error = %e, "could not mark files imported");
            }
        }
    }

    if !sent_emails.is_empty() {
        fanout_service::after_dispatch(state, &sent_emails).await;
    }

    info!(
        attempted = stats.attempted,
        sent = stats.sent,
        failed = stats.failed,
        "dispatch pass finished"
    );
    Ok(stats)
}

async fn send_one(state: &AppState, email: &Email) -> Result<SendOutcome> {
    let user = queries::user_by_id(&state.pool, email.created_by)
        .await
        .context("loading owning user")?
        .with_context(|| format!("email {} has no owning user {}", email.id, email.created_by))?;

    // a missing or unreadable file drops that attachment, never the email
    let mut attachments = Vec::new();
    for file_id in email.attachment_id_list() {
        match queries::file_by_id(&state.pool, file_id).await {
            Ok(Some(f)) => attachments.push(AttachmentBlob {
                filename: f.filename,
                content_type: f.content_type,
                bytes: f.content,
            }),
            Ok(None) => {
                warn!(email_id = email.id, file_id, "attachment row missing, sending without it")
            }
            Err(e) => {
                warn!(email_id = email.id, file_id, error = %e, "attachment load failed, sending without it")
            }
        }
    }

    state
        .collaborators
        .content
        .validate_html(&email.body_html)
        .await
        .context("body failed validation")?;

    let mail = OutboundEmail {
        from: Address::new(&email.from_name, &email.from_addr),
        to: Address::new(&email.to_name, &email.to_addr),
        cc: email.cc_list(),
        bcc: email.bcc_list(),
        subject: email.subject.clone(),
        body_html: email.body_html.clone(),
        attachments,
    };

    let via = user.resolved_method();
    let receipt = match via {
        SendMethod::Gmail | SendMethod::Outlook => send_webmail(state, via, user, &mail).await?,
        SendMethod::Smtp => {
            send_relay(state, &user, email, &mail).await?;
            SendReceipt::default()
        }
        SendMethod::Sendgrid => send_transactional(state, &user, &mail).await?,
    };
    Ok(SendOutcome { receipt, via })
}

/// Webmail send with the one-refresh rule: either the pre-send expiry check
/// refreshed already, or a 401 buys exactly one forced refresh and retry.
async fn send_webmail(
    state: &AppState,
    via: SendMethod,
    user: User,
    mail: &OutboundEmail,
) -> Result<SendReceipt> {
    let fresh = token_service::ensure_fresh(&state.pool, &state.http, &state.config, user).await?;

    let attempt = webmail_call(state, via, fresh.access_token(), mail).await;
    match attempt {
        Ok(receipt) => Ok(receipt),
        Err(SendError::Unauthorized(_)) if !fresh.refreshed => {
            info!(user_id = fresh.user.id, "provider rejected token, refreshing once");
            let user =
                token_service::refresh(&state.pool, &state.http, &state.config, fresh.user).await?;
            let token = user.oauth_access_token.as_deref().unwrap_or_default();
            Ok(webmail_call(state, via, token, mail).await?)
        }
        Err(e) => Err(e.into()),
    }
}

async fn webmail_call(
    state: &AppState,
    via: SendMethod,
    access_token: &str,
    mail: &OutboundEmail,
) -> Result<SendReceipt, SendError> {
    match via {
        SendMethod::Gmail => {
            GmailMailer {
                http: &state.http,
                api_base: &state.config.gmail_api_base,
                access_token,
            }
            .send(mail)
            .await
        }
        SendMethod::Outlook => {
            OutlookMailer {
                http: &state.http,
                api_base: &state.config.graph_api_base,
                access_token,
            }
            .send(mail)
            .await
        }
        other => Err(SendError::Message(format!(
            "{} is not a webmail method",
            other.as_str()
        ))),
    }
}

async fn send_relay(
    state: &AppState,
    user: &User,
    email: &Email,
    mail: &OutboundEmail,
) -> Result<()> {
    if !user.smtp_valid {
        anyhow::bail!("smtp credentials not validated for user {}", user.id);
    }
    let host = user.smtp_host.as_deref().unwrap_or_default();
    let username = user.smtp_username.as_deref().unwrap_or_default();
    let password = user.smtp_password.as_deref().unwrap_or_default();
    if host.is_empty() || username.is_empty() {
        anyhow::bail!("smtp settings incomplete for user {}", user.id);
    }

    let body = state
        .collaborators
        .content
        .render_smtp_body(email.id, &email.body_html)
        .await
        .context("rendering relay body")?;

    let relay = SmtpRelayMailer {
        http: &state.http,
        relay_url: &state.config.smtp_relay_url,
        timeout: Duration::from_secs(state.config.relay_timeout_secs),
    };
    relay
        .send(
            &SmtpCredentials {
                host,
                username,
                password,
            },
            &mail.to.addr,
            &mail.subject,
            &body,
        )
        .await?;
    Ok(())
}

async fn send_transactional(
    state: &AppState,
    user: &User,
    mail: &OutboundEmail,
) -> Result<SendReceipt> {
    // trial accounts send through the sandboxed key
    let api_key = if user.is_trial() {
        &state.config.sendgrid_sandbox_key
    } else {
        &state.config.sendgrid_api_key
    };
    let mailer = SendgridMailer {
        http: &state.http,
        api_base: &state.config.sendgrid_api_base,
        api_key,
    };
    Ok(mailer.send(mail).await?)
}

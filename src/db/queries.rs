use crate::db::now_epoch;
use crate::models::email::{Email, EmailPatch};
use crate::models::file::StoredFile;
use crate::models::unsubscribe::NewUnsubscribe;
use crate::models::user::{SendMethod, User};
use crate::providers::SendReceipt;
use sqlx::{SqliteConnection, SqlitePool};

/// Emails eligible for dispatch: queued, due, not cancelled. Each row is
/// picked up exactly once because success moves it past `queued` and failure
/// leaves it for the next pass.
pub async fn due_emails(pool: &SqlitePool, now: i64) -> Result<Vec<Email>, sqlx::Error> {
    sqlx::query_as::<_, Email>(
        r#"
        SELECT * FROM emails
        WHERE stage = 'queued' AND cancelled = 0
          AND send_at IS NOT NULL AND send_at <= ?
        ORDER BY send_at ASC, id ASC
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await
}

pub async fn email_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Email>, sqlx::Error> {
    sqlx::query_as::<_, Email>("SELECT * FROM emails WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn email_by_provider_key(
    pool: &SqlitePool,
    key: &str,
) -> Result<Option<Email>, sqlx::Error> {
    sqlx::query_as::<_, Email>("SELECT * FROM emails WHERE provider_message_id = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
}

pub async fn user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn file_by_id(pool: &SqlitePool, id: i64) -> Result<Option<StoredFile>, sqlx::Error> {
    sqlx::query_as::<_, StoredFile>("SELECT * FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn mark_files_imported(pool: &SqlitePool, ids: &[i64]) -> Result<(), sqlx::Error> {
    for id in ids {
        sqlx::query("UPDATE files SET imported = 1 WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Success write for one dispatched email. Phrased monotonically so a racing
/// delivery webhook can never be moved backwards, and the first recorded
/// identifiers win.
pub async fn mark_dispatched(
    pool: &SqlitePool,
    id: i64,
    via: SendMethod,
    receipt: &SendReceipt,
) -> Result<(), sqlx::Error> {
    let now = now_epoch();
    sqlx::query(
        r#"
        UPDATE emails SET
            stage = CASE WHEN stage IN ('draft','queued','dispatched') THEN 'delivered' ELSE stage END,
            sent_via = COALESCE(sent_via, ?),
            provider_message_id = COALESCE(provider_message_id, ?),
            thread_id = COALESCE(thread_id, ?),
            dispatched_at = COALESCE(dispatched_at, ?),
            last_error = NULL,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(via.as_str())
    .bind(receipt.provider_message_id.as_deref())
    .bind(receipt.thread_id.as_deref())
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Failed attempts leave the row queued; only the error text changes.
pub async fn record_dispatch_failure(
    pool: &SqlitePool,
    id: i64,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE emails SET last_error = ?, updated_at = ? WHERE id = ?")
        .bind(error)
        .bind(now_epoch())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn save_refreshed_token(
    pool: &SqlitePool,
    user_id: i64,
    access_token: &str,
    refresh_token: &str,
    expires_at: Option<i64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users SET
            oauth_access_token = ?,
            oauth_refresh_token = ?,
            oauth_token_expires_at = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .bind(now_epoch())
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Apply one accumulated webhook patch. Counters are additive, flags use MAX
/// so re-applies stay idempotent, and the stage write never moves backwards.
/// The first recorded failure reason is kept.
pub async fn apply_patch(
    conn: &mut SqliteConnection,
    id: i64,
    patch: &EmailPatch,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE emails SET
            opened_count = opened_count + ?,
            clicked_count = clicked_count + ?,
            provider_opened_count = provider_opened_count + ?,
            bounced = MAX(bounced, ?),
            spam = MAX(spam, ?),
            dropped = MAX(dropped, ?),
            failure_reason = COALESCE(failure_reason, ?),
            stage = CASE WHEN ? AND stage IN ('draft','queued','dispatched') THEN 'delivered' ELSE stage END,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(patch.opened_add)
    .bind(patch.clicked_add)
    .bind(patch.provider_opened_add)
    .bind(patch.set_bounced)
    .bind(patch.set_spam)
    .bind(patch.set_dropped)
    .bind(patch.failure_reason.as_deref())
    .bind(patch.mark_delivered)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_unsubscribe(
    conn: &mut SqliteConnection,
    unsub: &NewUnsubscribe,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO unsubscribes (created_by, list_id, contact_id, email, unsubscribed, created_at)
        VALUES (?, ?, ?, ?, 1, ?)
        "#,
    )
    .bind(unsub.created_by)
    .bind(unsub.list_id)
    .bind(unsub.contact_id)
    .bind(&unsub.email)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_email(pool: &SqlitePool, email: &Email) -> Result<i64, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO emails (
            created_by, list_id, contact_id,
            from_name, from_addr, to_name, to_addr, cc, bcc,
            subject, body_html, attachment_ids,
            send_at, cancelled, stage, sent_via, provider_message_id, thread_id,
            bounced, spam, dropped, failure_reason,
            opened_count, clicked_count, provider_opened_count,
            last_error, dispatched_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(email.created_by)
    .bind(email.list_id)
    .bind(email.contact_id)
    .bind(&email.from_name)
    .bind(&email.from_addr)
    .bind(&email.to_name)
    .bind(&email.to_addr)
    .bind(&email.cc)
    .bind(&email.bcc)
    .bind(&email.subject)
    .bind(&email.body_html)
    .bind(&email.attachment_ids)
    .bind(email.send_at)
    .bind(email.cancelled)
    .bind(email.stage.as_str())
    .bind(email.sent_via.as_deref())
    .bind(email.provider_message_id.as_deref())
    .bind(email.thread_id.as_deref())
    .bind(email.bounced)
    .bind(email.spam)
    .bind(email.dropped)
    .bind(email.failure_reason.as_deref())
    .bind(email.opened_count)
    .bind(email.clicked_count)
    .bind(email.provider_opened_count)
    .bind(email.last_error.as_deref())
    .bind(email.dispatched_at)
    .bind(email.created_at)
    .bind(email.updated_at)
    .execute(pool)
    .await?;
    Ok(res.last_insert_rowid())
}

pub async fn insert_user(pool: &SqlitePool, user: &User) -> Result<i64, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO users (
            email, name, method,
            oauth_access_token, oauth_refresh_token, oauth_token_expires_at,
            smtp_host, smtp_port, smtp_username, smtp_password, smtp_valid,
            external_email, quota_key, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.email)
    .bind(&user.name)
    .bind(user.method.as_str())
    .bind(user.oauth_access_token.as_deref())
    .bind(user.oauth_refresh_token.as_deref())
    .bind(user.oauth_token_expires_at)
    .bind(user.smtp_host.as_deref())
    .bind(user.smtp_port)
    .bind(user.smtp_username.as_deref())
    .bind(user.smtp_password.as_deref())
    .bind(user.smtp_valid)
    .bind(user.external_email)
    .bind(&user.quota_key)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await?;
    Ok(res.last_insert_rowid())
}

pub async fn insert_file(pool: &SqlitePool, file: &StoredFile) -> Result<i64, sqlx::Error> {
    let res = sqlx::query(
        "INSERT INTO files (filename, content_type, content, imported, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&file.filename)
    .bind(&file.content_type)
    .bind(&file.content)
    .bind(file.imported)
    .bind(file.created_at)
    .execute(pool)
    .await?;
    Ok(res.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::email::DeliveryStage;

    fn queued_email(created_by: i64, send_at: i64) -> Email {
        let mut email = Email::draft(created_by, "dest@example.com", "Launch", "<p>hi</p>");
        email.stage = DeliveryStage::Queued;
        email.send_at = Some(send_at);
        email
    }

    #[tokio::test]
    async fn due_query_skips_cancelled_future_and_finished_rows() {
        let pool = test_pool().await;
        let now = now_epoch();

        let due = insert_email(&pool, &queued_email(1, now - 60)).await.unwrap();

        let mut future = queued_email(1, now + 3600);
        insert_email(&pool, &future).await.unwrap();

        future = queued_email(1, now - 60);
        future.cancelled = true;
        insert_email(&pool, &future).await.unwrap();

        let mut finished = queued_email(1, now - 60);
        finished.stage = DeliveryStage::Delivered;
        insert_email(&pool, &finished).await.unwrap();

        let mut draft = queued_email(1, now - 60);
        draft.stage = DeliveryStage::Draft;
        insert_email(&pool, &draft).await.unwrap();

        let rows = due_emails(&pool, now).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, due);
    }

    #[tokio::test]
    async fn mark_dispatched_finishes_the_row_and_keeps_first_identifiers() {
        let pool = test_pool().await;
        let now = now_epoch();
        let id = insert_email(&pool, &queued_email(1, now - 60)).await.unwrap();

        let receipt = SendReceipt {
            provider_message_id: Some("abc123".to_string()),
            thread_id: Some("thr-1".to_string()),
        };
        mark_dispatched(&pool, id, SendMethod::Sendgrid, &receipt)
            .await
            .unwrap();

        let row = email_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(row.stage, DeliveryStage::Delivered);
        assert_eq!(row.sent_via.as_deref(), Some("sendgrid"));
        assert_eq!(row.provider_message_id.as_deref(), Some("abc123"));

        // a second write must not clobber what the first recorded
        let other = SendReceipt {
            provider_message_id: Some("zzz999".to_string()),
            thread_id: None,
        };
        mark_dispatched(&pool, id, SendMethod::Gmail, &other)
            .await
            .unwrap();
        let row = email_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(row.sent_via.as_deref(), Some("sendgrid"));
        assert_eq!(row.provider_message_id.as_deref(), Some("abc123"));
        assert_eq!(row.thread_id.as_deref(), Some("thr-1"));

        assert!(due_emails(&pool, now_epoch()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn patches_are_additive_and_flags_never_reset() {
        let pool = test_pool().await;
        let now = now_epoch();
        let mut email = queued_email(1, now - 60);
        email.stage = DeliveryStage::Delivered;
        let id = insert_email(&pool, &email).await.unwrap();

        let patch = EmailPatch {
            opened_add: 3,
            set_bounced: true,
            failure_reason: Some("550 user unknown".to_string()),
            ..Default::default()
        };
        let mut conn = pool.acquire().await.unwrap();
        apply_patch(&mut conn, id, &patch, now).await.unwrap();

        // a replayed bounce with a different reason must not rewrite history
        let second = EmailPatch {
            opened_add: 2,
            set_bounced: true,
            failure_reason: Some("552 mailbox full".to_string()),
            ..Default::default()
        };
        apply_patch(&mut conn, id, &second, now).await.unwrap();
        drop(conn);

        let row = email_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(row.opened_count, 5);
        assert!(row.bounced);
        assert_eq!(row.failure_reason.as_deref(), Some("550 user unknown"));
        assert_eq!(row.stage, DeliveryStage::Delivered);
    }

    #[tokio::test]
    async fn delivered_patch_never_regresses_a_finished_row() {
        let pool = test_pool().await;
        let now = now_epoch();
        let mut email = queued_email(1, now - 60);
        email.stage = DeliveryStage::Delivered;
        let id = insert_email(&pool, &email).await.unwrap();

        let patch = EmailPatch {
            mark_delivered: true,
            ..Default::default()
        };
        let mut conn = pool.acquire().await.unwrap();
        apply_patch(&mut conn, id, &patch, now).await.unwrap();
        drop(conn);

        let row = email_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(row.stage, DeliveryStage::Delivered);
    }
}

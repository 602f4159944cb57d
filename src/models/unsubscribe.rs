use serde::Serialize;

/// Persisted unsubscribe record. Append-only; duplicates are kept, one row
/// per provider event.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Unsubscribe {
    pub id: i64,
    pub created_by: i64,
    pub list_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub email: String,
    pub unsubscribed: bool,
    pub created_at: i64,
}

/// Insert shape built from the originating email plus the event's recipient
/// address.
#[derive(Debug, Clone)]
pub struct NewUnsubscribe {
    pub created_by: i64,
    pub list_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub email: String,
}

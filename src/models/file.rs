/// Uploaded file row. The wider app stores these; this service only reads
/// bytes at send time and flips `imported` after an attempt uses them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredFile {
    pub id: i64,
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
    pub imported: bool,
    pub created_at: i64,
}

impl StoredFile {
    pub fn new(filename: &str, content_type: &str, content: Vec<u8>) -> Self {
        StoredFile {
            id: 0,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            content,
            imported: false,
            created_at: crate::db::now_epoch(),
        }
    }
}

use sqlx::FromRow;

/// A stored paste, as visible to readers. The delete token is never selected.
#[derive(Debug, Clone, FromRow)]
pub struct Paste {
    pub name: String,
    pub content: String,
    pub mime: String,
    /// Unix seconds after which the paste is gone; `None` never expires.
    pub expires: Option<i64>,
}

/// A paste about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPaste {
    pub name: String,
    pub content: String,
    pub mime: String,
    pub expires: Option<i64>,
    pub delete_token: String,
}

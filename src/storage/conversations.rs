use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::database::from_unix;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub user_id: Option<String>,
    pub title: String,
    pub model: String,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            model: row.try_get("model")?,
            message_count: row.try_get("message_count")?,
            created_at: from_unix(row.try_get("created_at")?),
            updated_at: from_unix(row.try_get("updated_at")?),
        })
    }

    /// Conversations without an owner are visible to anonymous callers only.
    pub fn is_owned_by(&self, user_id: Option<&str>) -> bool {
        self.user_id.as_deref() == user_id
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

const SELECT_CONVERSATION: &str = r#"
    SELECT c.id, c.user_id, c.title, c.model, c.created_at, c.updated_at,
           (SELECT COUNT(*) FROM chat_messages m WHERE m.conversation_id = c.id) AS message_count
    FROM conversations c
"#;

/// Repository for chat conversations and their messages
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: Option<&str>, title: &str, model: &str) -> Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let title = if title.trim().is_empty() { "New chat" } else { title.trim() };

        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, model, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(title)
        .bind(model)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!("Created conversation {}", id);
        self.get(&id)
            .await?
            .ok_or_else(|| Error::not_found(format!("conversation {}", id)))
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        debug!("Retrieving conversation {}", conversation_id);
        let row = sqlx::query(&format!("{} WHERE c.id = ?", SELECT_CONVERSATION))
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Conversation::from_row).transpose()
    }

    /// Most recently active first.
    pub async fn list(
        &self,
        user_id: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(&format!(
            "{} WHERE c.user_id IS ? ORDER BY c.updated_at DESC, c.rowid DESC LIMIT ? OFFSET ?",
            SELECT_CONVERSATION
        ))
        .bind(user_id)
        .bind(limit.unwrap_or(50).clamp(1, 200))
        .bind(offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Conversation::from_row).collect()
    }

    /// Delete a conversation; its messages go with it.
    pub async fn delete(&self, conversation_id: &str) -> Result<()> {
        let rows = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(Error::not_found(format!("conversation {}", conversation_id)));
        }
        info!("Deleted conversation {}", conversation_id);
        Ok(())
    }

    pub async fn add_message(&self, conversation_id: &str, role: &str, content: &str) -> Result<StoredMessage> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(now.timestamp())
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if touched == 0 {
            return Err(Error::not_found(format!("conversation {}", conversation_id)));
        }

        sqlx::query(
            "INSERT INTO chat_messages (id, conversation_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Stored {} message in {}", role, conversation_id);

        Ok(StoredMessage {
            id,
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: from_unix(now.timestamp()),
        })
    }

    /// Messages in the order they were written.
    pub async fn get_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at
            FROM chat_messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StoredMessage {
                    id: row.try_get("id")?,
                    conversation_id: row.try_get("conversation_id")?,
                    role: row.try_get("role")?,
                    content: row.try_get("content")?,
                    created_at: from_unix(row.try_get("created_at")?),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::create_test_database;

    #[tokio::test]
    async fn test_conversation_lifecycle() {
        let (db, _dir) = create_test_database().await;
        let repo = ConversationRepository::new(db.get_pool());

        let conversation = repo.create(None, "  ", "gpt-4o-mini").await.unwrap();
        assert_eq!(conversation.title, "New chat");
        assert_eq!(conversation.message_count, 0);

        repo.add_message(&conversation.id, "user", "hi").await.unwrap();
        repo.add_message(&conversation.id, "assistant", "hello!").await.unwrap();

        let messages = repo.get_messages(&conversation.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].content, "hello!");
        assert_eq!(repo.get(&conversation.id).await.unwrap().unwrap().message_count, 2);

        repo.delete(&conversation.id).await.unwrap();
        assert!(repo.get(&conversation.id).await.unwrap().is_none());
        assert!(repo.get_messages(&conversation.id).await.unwrap().is_empty());
        assert!(matches!(repo.delete(&conversation.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_message_to_missing_conversation() {
        let (db, _dir) = create_test_database().await;
        let repo = ConversationRepository::new(db.get_pool());
        assert!(matches!(
            repo.add_message("missing", "user", "hi").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_owner() {
        let (db, _dir) = create_test_database().await;
        let repo = ConversationRepository::new(db.get_pool());

        repo.create(None, "anon", "gpt-4o-mini").await.unwrap();
        let listed = repo.list(None, None, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_owned_by(None));
        assert!(repo.list(Some("someone"), None, None).await.unwrap().is_empty());
    }
}

use {
    async_trait::async_trait,
    hotline_protocol::{Message, MessageId, NewMessage, Role, SenderRole, UserId},
    tracing::debug,
};

use crate::{Error, Result, SqliteStore};

/// Durable, ordered chat log partitioned by conversation.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return it with its newly assigned id.
    async fn append(&self, message: NewMessage) -> Result<Message>;

    /// All messages of one conversation, oldest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Message>>;

    /// Every message in the system, oldest first.
    async fn list_all(&self) -> Result<Vec<Message>>;

    /// Remove a single message. Returns whether a row existed.
    async fn delete_by_id(&self, id: MessageId) -> Result<bool>;

    /// Remove a whole conversation. Returns the number of rows removed.
    async fn delete_for_user(&self, user_id: UserId) -> Result<u64>;

    /// History visible to `role`: everything for the admin, one
    /// conversation otherwise.
    async fn list_for(&self, role: Role) -> Result<Vec<Message>> {
        match role {
            Role::Admin => self.list_all().await,
            Role::User(id) => self.list_for_user(id).await,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    text: String,
    user_id: i64,
    receiver_id: Option<i64>,
    sender_role: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        let sender_role: SenderRole = r
            .sender_role
            .parse()
            .map_err(|e| Error::Persistence(sqlx::Error::Decode(Box::new(e))))?;
        Ok(Self {
            id: r.id,
            text: r.text,
            user_id: r.user_id,
            receiver_id: r.receiver_id,
            sender_role,
        })
    }
}

fn decode_rows(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(&self, message: NewMessage) -> Result<Message> {
        let _writer = self.writer().await;
        let result = sqlx::query(
            "INSERT INTO messages (text, user_id, receiver_id, sender_role) VALUES (?, ?, ?, ?)",
        )
        .bind(&message.text)
        .bind(message.user_id)
        .bind(message.receiver_id)
        .bind(message.sender_role.as_str())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, user_id = message.user_id, "message appended");
        Ok(message.into_message(id))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, text, user_id, receiver_id, sender_role FROM messages
             WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        decode_rows(rows)
    }

    async fn list_all(&self) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, text, user_id, receiver_id, sender_role FROM messages ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        decode_rows(rows)
    }

    async fn delete_by_id(&self, id: MessageId) -> Result<bool> {
        let _writer = self.writer().await;
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<u64> {
        let _writer = self.writer().await;
        let result = sqlx::query("DELETE FROM messages WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;

    fn user_msg(text: &str, user_id: UserId) -> NewMessage {
        NewMessage::new(text, user_id, SenderRole::User)
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = store.append(user_msg("a", 1)).await.unwrap();
        let b = store
            .append(NewMessage::new("b", 1, SenderRole::Admin).with_receiver(Some(1)))
            .await
            .unwrap();
        assert!(b.id > a.id);
        assert_eq!(b.sender_role, SenderRole::Admin);
        assert_eq!(b.receiver_id, Some(1));

        let stored = store.list_for_user(1).await.unwrap();
        assert_eq!(stored, vec![a, b]);
    }

    #[tokio::test]
    async fn empty_conversation_is_not_an_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.list_for_user(5).await.unwrap().is_empty());
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(store.list_for(Role::User(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conversation_is_ordered_subset_of_all() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (i, user) in [1, 2, 1, 3, 2, 1].into_iter().enumerate() {
            store.append(user_msg(&format!("m{i}"), user)).await.unwrap();
        }

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));

        for user in [1, 2, 3, 4] {
            let expected: Vec<_> = all.iter().filter(|m| m.user_id == user).cloned().collect();
            assert_eq!(store.list_for_user(user).await.unwrap(), expected);
        }
        assert_eq!(store.list_for(Role::Admin).await.unwrap(), all);
    }

    #[tokio::test]
    async fn delete_by_id_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let m = store.append(user_msg("bye", 4)).await.unwrap();
        assert!(store.delete_by_id(m.id).await.unwrap());
        assert!(!store.delete_by_id(m.id).await.unwrap());
        assert!(!store.delete_by_id(9999).await.unwrap());
        assert!(store.list_for_user(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.append(user_msg("a", 1)).await.unwrap();
        let newest = store.append(user_msg("b", 1)).await.unwrap();
        store.delete_by_id(newest.id).await.unwrap();
        let next = store.append(user_msg("c", 1)).await.unwrap();
        assert!(next.id > newest.id);
    }

    #[tokio::test]
    async fn delete_for_user_clears_conversation() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.append(user_msg("a", 1)).await.unwrap();
        store.append(user_msg("b", 2)).await.unwrap();
        store.append(user_msg("c", 1)).await.unwrap();

        assert_eq!(store.delete_for_user(1).await.unwrap(), 2);
        assert!(store.list_for_user(1).await.unwrap().is_empty());
        assert_eq!(store.list_for_user(2).await.unwrap().len(), 1);
        assert_eq!(store.delete_for_user(1).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_get_unique_ids() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .append(user_msg(&format!("n{i}"), (i % 4) + 1))
                        .await
                        .unwrap()
                        .id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 32);

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 32);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn corrupt_sender_role_is_a_persistence_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        sqlx::query("INSERT INTO messages (text, user_id, sender_role) VALUES ('x', 1, 'robot')")
            .execute(store.pool())
            .await
            .unwrap();
        assert!(matches!(
            store.list_for_user(1).await,
            Err(Error::Persistence(_))
        ));
    }
}

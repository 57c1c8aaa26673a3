use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::Row;

use cartly_core::domain::conversation::{ConversationTurn, SessionId, TurnRole};

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn append_turn(
        &self,
        session: &SessionId,
        turn: ConversationTurn,
        cap: usize,
    ) -> Result<(), RepositoryError> {
        // Insert and prune in one transaction so a reader never observes
        // more than `cap` retained turns.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversation_turns (session_id, role, content, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&session.0)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(turn.at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM conversation_turns \
             WHERE session_id = ? AND id NOT IN ( \
                SELECT id FROM conversation_turns \
                WHERE session_id = ? \
                ORDER BY id DESC \
                LIMIT ?)",
        )
        .bind(&session.0)
        .bind(&session.0)
        .bind(cap as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn recent_turns(
        &self,
        session: &SessionId,
        cap: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, content, created_at FROM ( \
                SELECT id, role, content, created_at FROM conversation_turns \
                WHERE session_id = ? \
                ORDER BY id DESC \
                LIMIT ?) \
             ORDER BY id ASC",
        )
        .bind(&session.0)
        .bind(cap as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let role: String = row.try_get("role")?;
                let content: String = row.try_get("content")?;
                let created_at: String = row.try_get("created_at")?;
                Ok(ConversationTurn {
                    role: TurnRole::from_str(&role).map_err(RepositoryError::Decode)?,
                    content,
                    at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|error| {
                            RepositoryError::Decode(format!(
                                "bad turn timestamp `{created_at}`: {error}"
                            ))
                        })?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use cartly_core::domain::conversation::{ConversationTurn, SessionId, TurnRole};

    use super::SqlSessionRepository;
    use crate::migrations::run_pending;
    use crate::repositories::SessionRepository;
    use crate::connect_with_settings;

    async fn repository() -> SqlSessionRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlSessionRepository::new(pool)
    }

    #[tokio::test]
    async fn turns_come_back_in_arrival_order() {
        let repository = repository().await;
        let session = SessionId("s-1".to_string());

        for content in ["hello", "hi there", "any formula for a 1 year old?"] {
            repository
                .append_turn(&session, ConversationTurn::user(content), 10)
                .await
                .expect("append");
        }

        let turns = repository.recent_turns(&session, 10).await.expect("read");
        let contents: Vec<_> = turns.iter().map(|turn| turn.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "hi there", "any formula for a 1 year old?"]);
    }

    #[tokio::test]
    async fn oldest_turns_are_evicted_past_the_cap() {
        let repository = repository().await;
        let session = SessionId("s-evict".to_string());

        for index in 0..6 {
            repository
                .append_turn(&session, ConversationTurn::user(format!("turn {index}")), 4)
                .await
                .expect("append");
        }

        let turns = repository.recent_turns(&session, 4).await.expect("read");
        let contents: Vec<_> = turns.iter().map(|turn| turn.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 2", "turn 3", "turn 4", "turn 5"]);
    }

    #[tokio::test]
    async fn sessions_do_not_leak_into_each_other() {
        let repository = repository().await;
        let alpha = SessionId("alpha".to_string());
        let beta = SessionId("beta".to_string());

        repository
            .append_turn(&alpha, ConversationTurn::user("alpha secret"), 10)
            .await
            .expect("append");
        repository
            .append_turn(&beta, ConversationTurn::assistant("beta reply"), 10)
            .await
            .expect("append");

        let beta_turns = repository.recent_turns(&beta, 10).await.expect("read");
        assert_eq!(beta_turns.len(), 1);
        assert_eq!(beta_turns[0].role, TurnRole::Assistant);
        assert!(!beta_turns.iter().any(|turn| turn.content.contains("alpha")));
    }
}

use std::sync::Arc;

use cartly_core::domain::conversation::{ConversationTurn, SessionId};
use cartly_core::errors::AssistantError;
use cartly_db::repositories::SessionRepository;

/// Bounded per-session history. Appends evict the oldest turn once the
/// cap is reached; eviction is silent and irreversible. Sessions never
/// see each other's turns.
pub struct ConversationMemory {
    store: Arc<dyn SessionRepository>,
    cap: usize,
}

impl ConversationMemory {
    pub fn new(store: Arc<dyn SessionRepository>, cap: usize) -> Self {
        Self { store, cap: cap.max(1) }
    }

    pub async fn append(
        &self,
        session: &SessionId,
        turn: ConversationTurn,
    ) -> Result<(), AssistantError> {
        self.store
            .append_turn(session, turn, self.cap)
            .await
            .map_err(|error| AssistantError::internal(error.to_string()))
    }

    /// Retained turns in arrival order, most recent last.
    pub async fn history(&self, session: &SessionId) -> Result<Vec<ConversationTurn>, AssistantError> {
        self.store
            .recent_turns(session, self.cap)
            .await
            .map_err(|error| AssistantError::internal(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartly_db::repositories::InMemorySessionRepository;

    #[tokio::test]
    async fn caps_history_and_keeps_most_recent() {
        let memory =
            ConversationMemory::new(Arc::new(InMemorySessionRepository::default()), 3);
        let session = SessionId("s1".to_string());

        for i in 0..5 {
            memory.append(&session, ConversationTurn::user(format!("turn {i}"))).await.unwrap();
        }

        let history = memory.history(&session).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|turn| turn.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 2", "turn 3", "turn 4"]);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let memory =
            ConversationMemory::new(Arc::new(InMemorySessionRepository::default()), 10);
        let alice = SessionId("alice".to_string());
        let bob = SessionId("bob".to_string());

        memory.append(&alice, ConversationTurn::user("hi from alice")).await.unwrap();
        memory.append(&bob, ConversationTurn::user("hi from bob")).await.unwrap();

        let alice_history = memory.history(&alice).await.unwrap();
        assert_eq!(alice_history.len(), 1);
        assert_eq!(alice_history[0].content, "hi from alice");
    }
}

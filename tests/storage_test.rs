//! Integration tests for SQLite storage layer
//!
//! Tests session persistence using in-memory and file-backed databases.

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

use grammar_tutor::config::DatabaseConfig;
use grammar_tutor::gemini::ModelCandidate;
use grammar_tutor::quiz::{QuestionBank, QuizMode};
use grammar_tutor::session::{ChatTurn, SessionState};
use grammar_tutor::storage::{SqliteStorage, Storage};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

/// A session with some quiz progress, chat and cached candidates
fn busy_session() -> SessionState {
    let bank = QuestionBank::builtin();
    let mut rng = StdRng::seed_from_u64(7);
    let mut session = SessionState::with_id("busy").with_seed(99);

    let presented = session.quiz.next_question(&bank, &mut rng).unwrap();
    session
        .quiz
        .submit_answer(presented.question.id, "틀린 답")
        .unwrap();
    session.quiz.start_retry().unwrap();
    session.quiz.next_question(&bank, &mut rng).unwrap();

    session.transcript.push(ChatTurn::user("'왠지'와 '웬지' 중 뭐가 맞아요?"));
    session.transcript.push(ChatTurn::assistant("'왠지'가 맞아요."));
    session.model_candidates = Some(vec![ModelCandidate::new("v1beta", "gemini-1.5-flash")]);
    session
}

#[cfg(test)]
mod session_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_save_and_get_session() {
        let storage = create_test_storage().await;
        let session = SessionState::new();

        storage.save_session(&session).await.unwrap();
        let retrieved = storage.get_session(&session.id).await.unwrap();

        assert_eq!(retrieved, Some(session));
    }

    #[tokio::test]
    async fn test_get_nonexistent_session() {
        let storage = create_test_storage().await;

        let result = storage.get_session("nonexistent-id").await.unwrap();
        assert!(result.is_none(), "Should return None for nonexistent session");
    }

    #[tokio::test]
    async fn test_full_state_round_trips() {
        let storage = create_test_storage().await;
        let session = busy_session();

        storage.save_session(&session).await.unwrap();
        let restored = storage.get_session("busy").await.unwrap().unwrap();

        assert_eq!(restored.seed, 99);
        assert_eq!(restored.quiz.incorrect.live_count(), 1);
        assert!(matches!(restored.quiz.mode, QuizMode::Retry { cursor: 0 }));
        assert!(restored.quiz.current.as_ref().unwrap().is_retry);
        assert_eq!(restored.transcript.len(), 2);
        assert_eq!(restored, session);
    }

    #[tokio::test]
    async fn test_save_session_overwrites() {
        let storage = create_test_storage().await;
        let mut session = SessionState::with_id("up");

        storage.save_session(&session).await.unwrap();
        session.quiz.stats.record(true);
        session.transcript.push(ChatTurn::user("안녕하세요"));
        session.touch();
        storage.save_session(&session).await.unwrap();

        let restored = storage.get_session("up").await.unwrap().unwrap();
        assert_eq!(restored.quiz.stats.total, 1);
        assert_eq!(restored.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let storage = create_test_storage().await;
        let mut first = SessionState::with_id("first");
        let second = SessionState::with_id("second");
        first.quiz.stats.record(false);

        storage.save_session(&first).await.unwrap();
        storage.save_session(&second).await.unwrap();

        let restored = storage.get_session("second").await.unwrap().unwrap();
        assert_eq!(restored.quiz.stats.total, 0);
        assert_eq!(restored, second);
    }
}

#[cfg(test)]
mod file_backed_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_sessions_survive_reopen() {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("tutor.db"),
            max_connections: 1,
        };

        let session = busy_session();
        {
            let storage = SqliteStorage::new(&config).await.unwrap();
            storage.save_session(&session).await.unwrap();
            storage.pool().close().await;
        }

        let storage = SqliteStorage::new(&config).await.unwrap();
        let restored = storage.get_session("busy").await.unwrap();
        assert_eq!(restored, Some(session));
    }
}

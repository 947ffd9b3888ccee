//! One conversation behind a turn guard.
//!
//! Turns of the same conversation must never interleave. The session holds
//! the engine behind a mutex: [`ConversationSession::try_process_turn`]
//! rejects a second turn while one is running, and
//! [`ConversationSession::process_turn`] queues behind it.

use dialogue_state::ConversationId;
use std::sync::{Mutex, MutexGuard, TryLockError};

use crate::engine::{EngineMetrics, PolicyEngine, TurnResult};
use crate::error::{PolicyError, Result};

/// A conversation and the engine that owns its state.
#[derive(Debug)]
pub struct ConversationSession {
    id: ConversationId,
    engine: Mutex<PolicyEngine>,
}

impl ConversationSession {
    pub fn new(engine: PolicyEngine) -> Self {
        Self {
            id: engine.knowledge().conversation_id,
            engine: Mutex::new(engine),
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Run a turn, or fail with [`PolicyError::TurnInProgress`] if one is running.
    pub fn try_process_turn(&self, utterance: &str, is_first_turn: bool) -> Result<TurnResult> {
        let mut engine = match self.engine.try_lock() {
            Ok(engine) => engine,
            Err(TryLockError::WouldBlock) => return Err(PolicyError::TurnInProgress(self.id)),
            Err(TryLockError::Poisoned(_)) => return Err(PolicyError::Poisoned(self.id)),
        };
        Ok(engine.process_turn(utterance, is_first_turn))
    }

    /// Run a turn, waiting for any turn in progress to finish first.
    pub fn process_turn(&self, utterance: &str, is_first_turn: bool) -> Result<TurnResult> {
        Ok(self.lock()?.process_turn(utterance, is_first_turn))
    }

    pub fn metrics(&self) -> Result<EngineMetrics> {
        Ok(self.lock()?.get_metrics())
    }

    fn lock(&self) -> Result<MutexGuard<'_, PolicyEngine>> {
        self.engine.lock().map_err(|_| PolicyError::Poisoned(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ActionCatalog;
    use crate::composer::Composition;
    use crate::config::PolicyConfig;
    use crate::engine::{GeneratedResponse, ResponseGenerator, SelectiveContext};
    use crate::error::CapabilityError;

    fn session() -> ConversationSession {
        let catalog = ActionCatalog::from_toml_str(
            r#"
            [[actions]]
            id = "welcome"
            category = "onboarding"
            triggers = ["first_turn"]
            "#,
        )
        .unwrap();
        ConversationSession::new(PolicyEngine::new(PolicyConfig::default(), catalog).unwrap())
    }

    #[test]
    fn test_turns_run_through_session() {
        let session = session();
        let result = session.try_process_turn("hi", true).unwrap();
        assert_eq!(result.reactive_action_id, "welcome");
        session.process_turn("ok", false).unwrap();
        assert_eq!(session.metrics().unwrap().turn_count, 2);
    }

    #[test]
    fn test_concurrent_turn_is_rejected() {
        let session = session();
        let _running = session.engine.lock().unwrap();

        let result = session.try_process_turn("hi", true);
        assert!(matches!(result, Err(PolicyError::TurnInProgress(id)) if id == session.id()));
    }

    #[test]
    fn test_poisoned_session_reports_error() {
        let session = session();
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let _engine = session.engine.lock().unwrap();
                panic!("turn aborted");
            });
            assert!(handle.join().is_err());
        });

        assert!(matches!(session.try_process_turn("hi", false), Err(PolicyError::Poisoned(_))));
        assert!(matches!(session.metrics(), Err(PolicyError::Poisoned(_))));
    }

    struct CrashingGenerator;

    impl ResponseGenerator for CrashingGenerator {
        fn generate(
            &self,
            _composition: &Composition<'_>,
            _context: &SelectiveContext,
        ) -> std::result::Result<GeneratedResponse, CapabilityError> {
            panic!("generator crashed");
        }
    }

    #[test]
    fn test_generator_crash_leaves_session_usable() {
        let engine = session().engine.into_inner().unwrap();
        let session = ConversationSession::new(engine.with_generator(Box::new(CrashingGenerator)));

        let first = session.try_process_turn("hi", true).unwrap();
        assert_eq!(first.reactive_action_id, "general_response");
        assert!(session.try_process_turn("hi again", false).is_ok());
        assert_eq!(session.metrics().unwrap().turn_count, 2);
    }

    #[test]
    fn test_sessions_are_independent() {
        let a = session();
        let b = session();
        assert_ne!(a.id(), b.id());

        a.process_turn("hi", true).unwrap();
        assert_eq!(b.metrics().unwrap().turn_count, 0);
    }
}

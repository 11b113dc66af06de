//! Agent lifecycle state machine

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{AgentError, Result};

/// Lifecycle state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Running,
    Finished,
    Error,
}

impl AgentState {
    /// Legal edges: Idle→Running, Running→{Running, Finished, Error},
    /// {Finished, Error}→Idle.
    pub fn can_transition_to(self, target: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, target),
            (Idle, Running)
                | (Running, Running)
                | (Running, Finished)
                | (Running, Error)
                | (Finished, Idle)
                | (Error, Idle)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Finished | AgentState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Running => "running",
            AgentState::Finished => "finished",
            AgentState::Error => "error",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds the single active state.
///
/// Clones share the same state. Reads never block; observers can
/// `subscribe()` to follow transitions.
#[derive(Debug, Clone)]
pub struct StateMachine {
    tx: Arc<watch::Sender<AgentState>>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AgentState::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> AgentState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.tx.subscribe()
    }

    /// Move to `target`, failing on an illegal edge
    pub fn transition(&self, target: AgentState) -> Result<()> {
        let current = self.current();
        if !current.can_transition_to(target) {
            return Err(AgentError::InvalidStateTransition {
                from: current,
                to: target,
            });
        }
        if current != target {
            debug!("State {} -> {}", current, target);
        }
        self.tx.send_replace(target);
        Ok(())
    }

    /// Return a finished or failed machine to `Idle`
    pub fn reset(&self) -> Result<()> {
        self.transition(AgentState::Idle)
    }

    /// Enter `Running`, returning a guard that puts the prior state back
    /// unless `finish` is called.
    pub fn enter_running(&self) -> Result<RunningGuard> {
        let prior = self.current();
        self.transition(AgentState::Running)?;
        Ok(RunningGuard {
            machine: self.clone(),
            prior,
            finished: false,
        })
    }

    /// Run `body` inside `Running`.
    ///
    /// If the body returns `Ok`, the machine advances to the state chosen
    /// by `terminal`; if it returns `Err`, panics, or is dropped before
    /// completing, the prior state is restored.
    pub async fn scoped<T, F>(
        &self,
        body: F,
        terminal: impl FnOnce(&T) -> AgentState,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let guard = self.enter_running()?;
        let value = body.await?;
        guard.finish(terminal(&value))?;
        Ok(value)
    }

    fn restore(&self, state: AgentState) {
        self.tx.send_replace(state);
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped hold on the `Running` state
#[derive(Debug)]
pub struct RunningGuard {
    machine: StateMachine,
    prior: AgentState,
    finished: bool,
}

impl RunningGuard {
    /// Advance to a terminal state
    pub fn finish(mut self, terminal: AgentState) -> Result<()> {
        self.finished = true;
        self.machine.transition(terminal)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "Run exited without completing, restoring state {}",
                self.prior
            );
            self.machine.restore(self.prior);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AgentState; 4] = [
        AgentState::Idle,
        AgentState::Running,
        AgentState::Finished,
        AgentState::Error,
    ];

    #[test]
    fn test_legal_edges_exactly() {
        let legal = [
            (AgentState::Idle, AgentState::Running),
            (AgentState::Running, AgentState::Running),
            (AgentState::Running, AgentState::Finished),
            (AgentState::Running, AgentState::Error),
            (AgentState::Finished, AgentState::Idle),
            (AgentState::Error, AgentState::Idle),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_illegal_transition_reports_both_states() {
        let machine = StateMachine::new();
        let err = machine.transition(AgentState::Finished).unwrap_err();
        match err {
            AgentError::InvalidStateTransition { from, to } => {
                assert_eq!(from, AgentState::Idle);
                assert_eq!(to, AgentState::Finished);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(machine.current(), AgentState::Idle);
    }

    #[test]
    fn test_full_cycle_and_reset() {
        let machine = StateMachine::new();
        machine.transition(AgentState::Running).unwrap();
        machine.transition(AgentState::Running).unwrap();
        machine.transition(AgentState::Error).unwrap();
        assert!(machine.current().is_terminal());
        machine.reset().unwrap();
        assert_eq!(machine.current(), AgentState::Idle);
        assert!(machine.reset().is_err());
    }

    #[test]
    fn test_guard_drop_restores_prior_state() {
        let machine = StateMachine::new();
        {
            let _guard = machine.enter_running().unwrap();
            assert_eq!(machine.current(), AgentState::Running);
        }
        assert_eq!(machine.current(), AgentState::Idle);
    }

    #[test]
    fn test_guard_finish_advances() {
        let machine = StateMachine::new();
        let guard = machine.enter_running().unwrap();
        guard.finish(AgentState::Finished).unwrap();
        assert_eq!(machine.current(), AgentState::Finished);
    }

    #[test]
    fn test_enter_running_from_finished_fails() {
        let machine = StateMachine::new();
        machine
            .enter_running()
            .unwrap()
            .finish(AgentState::Finished)
            .unwrap();
        assert!(machine.enter_running().is_err());
        assert_eq!(machine.current(), AgentState::Finished);
    }

    #[tokio::test]
    async fn test_scoped_ok_uses_terminal() {
        let machine = StateMachine::new();
        let value = machine
            .scoped(async { Ok(7) }, |v| {
                if *v > 5 {
                    AgentState::Finished
                } else {
                    AgentState::Error
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(machine.current(), AgentState::Finished);
    }

    #[tokio::test]
    async fn test_scoped_err_restores_prior() {
        let machine = StateMachine::new();
        let result: Result<()> = machine
            .scoped(async { Err(AgentError::NoActionChosen) }, |_| {
                AgentState::Finished
            })
            .await;
        assert!(result.is_err());
        assert_eq!(machine.current(), AgentState::Idle);
    }

    #[tokio::test]
    async fn test_scoped_panic_restores_prior() {
        let machine = StateMachine::new();
        let inner = machine.clone();
        let handle = tokio::spawn(async move {
            inner
                .scoped(
                    async {
                        panic!("body blew up");
                        #[allow(unreachable_code)]
                        Ok(())
                    },
                    |_| AgentState::Finished,
                )
                .await
        });
        assert!(handle.await.is_err());
        assert_eq!(machine.current(), AgentState::Idle);
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let machine = StateMachine::new();
        let mut rx = machine.subscribe();
        machine.transition(AgentState::Running).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AgentState::Running);
    }
}

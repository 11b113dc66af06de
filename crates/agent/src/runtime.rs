//! Runtime loop
//!
//! Drives an agent through the state machine, bounded by `max_steps`, and
//! runs the agent's cleanup exactly once however the run ends.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ravel_provider::{Message, Role};

use crate::agent::Agent;
use crate::state::{AgentState, StateMachine};
use crate::stuck::StuckMonitor;
use crate::tools::terminate::TERMINATE_TOOL_NAME;
use crate::{AgentError, Result};

/// Loop policy
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub max_steps: usize,
    pub duplicate_threshold: usize,
    /// Completion failures end the run in `Error`; when false they are
    /// recorded as the step result and the loop continues.
    pub abort_on_completion_error: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_steps: 20,
            duplicate_threshold: 2,
            abort_on_completion_error: true,
        }
    }
}

/// What a finished run looked like
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: AgentState,
    pub steps: usize,
    /// One line per step, "Step i: ..."
    pub results: Vec<String>,
    pub max_steps_reached: bool,
    pub cancelled: bool,
    pub error: Option<String>,
    /// Full memory at the end of the run
    pub messages: Vec<Message>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == AgentState::Finished
    }

    pub fn summary(&self) -> String {
        if self.results.is_empty() {
            "No steps executed".to_string()
        } else {
            self.results.join("\n")
        }
    }

    /// Output of the last termination tool call, if any, without the
    /// observation header
    pub fn final_answer(&self) -> Option<&str> {
        let text = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Tool && m.name.as_deref() == Some(TERMINATE_TOOL_NAME))
            .map(Message::text)?;
        let header = format!("Observed output of cmd `{}` executed:\n", TERMINATE_TOOL_NAME);
        Some(text.strip_prefix(header.as_str()).unwrap_or(text))
    }
}

#[derive(Debug, Default)]
struct LoopOutcome {
    steps: usize,
    results: Vec<String>,
    terminated: bool,
    max_steps_reached: bool,
    cancelled: bool,
    error: Option<String>,
}

impl LoopOutcome {
    fn status(&self) -> AgentState {
        if self.cancelled || self.error.is_some() {
            AgentState::Error
        } else {
            AgentState::Finished
        }
    }
}

/// Owns an agent and its lifecycle
pub struct Runtime<A: Agent> {
    agent: A,
    state: StateMachine,
    options: RuntimeOptions,
    stuck: StuckMonitor,
    cancel: CancellationToken,
    cleaned_up: bool,
}

impl<A: Agent> Runtime<A> {
    pub fn new(agent: A, options: RuntimeOptions) -> Self {
        let stuck = StuckMonitor::new(options.duplicate_threshold);
        Self {
            agent,
            state: StateMachine::new(),
            options,
            stuck,
            cancel: CancellationToken::new(),
            cleaned_up: false,
        }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut A {
        &mut self.agent
    }

    pub fn state(&self) -> AgentState {
        self.state.current()
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.state
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Token that stops the current run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up
    }

    /// Run until termination, the step bound, a fatal error or cancellation.
    ///
    /// `request` is appended as a user message first. Only lifecycle misuse
    /// is returned as `Err`; every other failure is reported in the
    /// `RunReport` with status `Error`.
    pub async fn run(&mut self, request: Option<&str>) -> Result<RunReport> {
        let current = self.state.current();
        if current != AgentState::Idle {
            return Err(AgentError::InvalidStateTransition {
                from: current,
                to: AgentState::Running,
            });
        }

        if let Some(request) = request {
            self.agent.memory_mut().append(Message::user(request));
        }

        let machine = self.state.clone();
        let outcome = machine.scoped(self.drive(), LoopOutcome::status).await;
        self.shutdown().await;
        let outcome = outcome?;

        let status = self.state.current();
        info!(
            "Run finished with status {} after {} step(s)",
            status, outcome.steps
        );
        Ok(RunReport {
            status,
            steps: outcome.steps,
            results: outcome.results,
            max_steps_reached: outcome.max_steps_reached,
            cancelled: outcome.cancelled,
            error: outcome.error,
            messages: self.agent.memory().messages().to_vec(),
        })
    }

    async fn drive(&mut self) -> Result<LoopOutcome> {
        let cancel = self.cancel.clone();
        let max_steps = self.options.max_steps;
        let mut outcome = LoopOutcome::default();

        while outcome.steps < max_steps {
            if cancel.is_cancelled() {
                warn!("Run cancelled before step {}", outcome.steps + 1);
                outcome.cancelled = true;
                outcome.error = Some(AgentError::Cancelled.to_string());
                break;
            }

            self.state.transition(AgentState::Running)?;
            outcome.steps += 1;
            let n = outcome.steps;
            info!("Executing step {}/{}", n, max_steps);

            match self.agent.step(&cancel).await {
                Ok(step) => {
                    outcome.results.push(format!("Step {}: {}", n, step.result));
                    self.stuck.check(self.agent.memory_mut());
                    if step.terminate {
                        outcome.terminated = true;
                        break;
                    }
                }
                Err(AgentError::Cancelled) => {
                    warn!("Step {} cancelled", n);
                    outcome.results.push(format!("Step {}: Error: run cancelled", n));
                    outcome.cancelled = true;
                    outcome.error = Some(AgentError::Cancelled.to_string());
                    break;
                }
                Err(e) if self.is_recoverable(&e) => {
                    warn!("Step {} failed: {}", n, e);
                    outcome.results.push(format!("Step {}: Error: {}", n, e));
                    // Recorded as an observation for the next request.
                    if !matches!(e, AgentError::Completion(_)) {
                        self.agent
                            .memory_mut()
                            .append(Message::user(format!("Error: {}", e)));
                    }
                    self.stuck.check(self.agent.memory_mut());
                }
                Err(e) => {
                    error!("Step {} failed fatally: {}", n, e);
                    outcome.results.push(format!("Step {}: Error: {}", n, e));
                    outcome.error = Some(e.to_string());
                    break;
                }
            }
        }

        let ended_early = outcome.terminated || outcome.cancelled || outcome.error.is_some();
        if !ended_early && outcome.steps >= max_steps {
            info!("Reached max steps ({})", max_steps);
            outcome.max_steps_reached = true;
            outcome
                .results
                .push(format!("Terminated: Reached max steps ({})", max_steps));
        }
        Ok(outcome)
    }

    fn is_recoverable(&self, err: &AgentError) -> bool {
        match err {
            AgentError::Completion(_) => !self.options.abort_on_completion_error,
            other => other.is_step_recoverable(),
        }
    }

    /// Return a finished run to `Idle` so `run` can be called again.
    ///
    /// A cancelled token is replaced; fetch it again with `cancel_token`.
    pub fn reset(&mut self) -> Result<()> {
        self.state.reset()?;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        Ok(())
    }

    /// Run the agent's cleanup if it has not run yet
    pub async fn shutdown(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.agent.cleanup().await;
    }
}

use statig::prelude::*;

use super::ledger::RunStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start,
    Finish,
    Fail,
}

/// Run status transitions: `idle → running → complete | error`, and a new
/// `Start` from any non-running state.
#[derive(Debug, Default)]
pub struct RunLifecycle {
    status: RunStatus,
    runs_started: u64,
}

impl RunLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

#[state_machine(initial = "State::idle()")]
impl RunLifecycle {
    #[state]
    fn idle(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Start => self.begin_run(),
            _ => Handled,
        }
    }

    #[state]
    fn running(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Start => {
                tracing::warn!("Start ignored: a run is already in flight");
                Handled
            }
            LifecycleEvent::Finish => {
                self.status = RunStatus::Complete;
                tracing::info!(runs_started = self.runs_started, "Run completed");
                Transition(State::complete())
            }
            LifecycleEvent::Fail => {
                self.status = RunStatus::Error;
                tracing::info!(runs_started = self.runs_started, "Run failed");
                Transition(State::failed())
            }
        }
    }

    #[state]
    fn complete(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Start => self.begin_run(),
            _ => Handled,
        }
    }

    #[state]
    fn failed(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Start => self.begin_run(),
            _ => Handled,
        }
    }
}

impl RunLifecycle {
    fn begin_run(&mut self) -> Outcome<State> {
        self.status = RunStatus::Running;
        self.runs_started += 1;
        tracing::debug!(runs_started = self.runs_started, "Run started");
        Transition(State::running())
    }
}

use super::collaborators::{
    Actuator, DecisionProvider, DecisionRequest, EventDispatch, GameBridge, ScreenCapture,
};
use super::{LoopConfig, RECENT_ACTIONS};
use crate::error::{AgentError, AgentResult, ErrorCode};
use crate::model::{utc_now_rfc3339, Action, AgentState, AgentStatus};
use crate::rate_limit::RateLimiter;
use crate::recorder::StepRecorder;
use crate::status::StatusStore;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WORKER_THREAD: &str = "agent-loop";
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Collaborators driven by the loop.
pub struct AgentContext {
    pub bridge: Arc<dyn GameBridge>,
    pub capture: Arc<dyn ScreenCapture>,
    pub decisions: Arc<dyn DecisionProvider>,
    pub actuator: Arc<dyn Actuator>,
    pub events: Option<Arc<dyn EventDispatch>>,
    pub recorder: StepRecorder,
    pub rules_text: Option<String>,
}

/// Starts, pauses, resumes and stops one background loop worker.
///
/// All methods take `&self` and are safe to call from any thread. Status is
/// only ever handed out as a copy.
pub struct AgentController {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

struct Shared {
    bridge: Arc<dyn GameBridge>,
    capture: Arc<dyn ScreenCapture>,
    decisions: Arc<dyn DecisionProvider>,
    actuator: Arc<dyn Actuator>,
    recorder: StepRecorder,
    rules_text: Option<String>,
    config: LoopConfig,
    status: StatusStore,
    paused: AtomicBool,
    generation: AtomicU64,
    events: Mutex<Option<Arc<dyn EventDispatch>>>,
    budget: Mutex<Budget>,
}

/// Outlives individual workers so a restart does not reset the budget.
struct Budget {
    limiter: RateLimiter,
    recent: VecDeque<Value>,
}

impl AgentController {
    #[must_use]
    pub fn new(context: AgentContext, config: LoopConfig) -> Self {
        let limiter = RateLimiter::new(config.max_actions, config.rate_window);
        let shared = Shared {
            bridge: context.bridge,
            capture: context.capture,
            decisions: context.decisions,
            actuator: context.actuator,
            recorder: context.recorder,
            rules_text: context.rules_text,
            config,
            status: StatusStore::new(),
            paused: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            events: Mutex::new(context.events),
            budget: Mutex::new(Budget {
                limiter,
                recent: VecDeque::with_capacity(RECENT_ACTIONS),
            }),
        };
        Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker, or un-pause the one already running.
    pub fn start(&self) -> AgentResult<()> {
        let mut slot = self.lock_worker();
        self.shared.paused.store(false, Ordering::SeqCst);

        if let Some(worker) = slot.as_ref() {
            if !worker.handle.is_finished() {
                self.shared.status.set_flags(true, false);
                return Ok(());
            }
        }
        if let Some(finished) = slot.take() {
            let _ = finished.handle.join();
        }

        let stop = Arc::new(AtomicBool::new(false));
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.status.set_flags(true, false);

        let shared = Arc::clone(&self.shared);
        let worker_stop = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD.to_string())
            .spawn(move || run_worker(&shared, &worker_stop, generation));
        match spawned {
            Ok(handle) => {
                tracing::info!(generation, "agent loop started");
                *slot = Some(Worker { handle, stop });
                Ok(())
            }
            Err(err) => {
                self.shared.status.set_flags(false, true);
                Err(AgentError::io(
                    ErrorCode::FatalLoop,
                    "failed to spawn agent loop",
                    err,
                ))
            }
        }
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        self.shared.status.update(|status| status.paused = true);
        tracing::info!("agent loop paused");
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.status.update(|status| status.paused = false);
        tracing::info!("agent loop resumed");
    }

    /// Signal the worker and wait up to the stop timeout for it to exit.
    ///
    /// A worker stuck in a collaborator call is detached; its own stop flag
    /// stays set so it exits at its next checkpoint.
    pub fn stop(&self) {
        let mut slot = self.lock_worker();
        self.shared.paused.store(false, Ordering::SeqCst);
        if let Some(worker) = slot.take() {
            worker.stop.store(true, Ordering::SeqCst);
            let deadline = Instant::now() + self.shared.config.stop_timeout;
            while !worker.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }
            if worker.handle.is_finished() {
                if worker.handle.join().is_err() {
                    tracing::warn!("agent loop thread panicked");
                }
            } else {
                tracing::warn!(
                    timeout_ms = self.shared.config.stop_timeout.as_millis(),
                    "agent loop did not stop in time; detaching"
                );
            }
            tracing::info!("agent loop stopped");
        }
        self.shared.status.set_flags(false, true);
    }

    #[must_use]
    pub fn get_status(&self) -> AgentStatus {
        self.shared.status.snapshot()
    }

    #[must_use]
    pub fn state(&self) -> AgentState {
        self.get_status().state()
    }

    /// Replace the event handler. The worker picks it up on its next step.
    pub fn set_event_handler(&self, handler: Option<Arc<dyn EventDispatch>>) {
        *self
            .shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AgentController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AgentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentController")
            .field("config", &self.shared.config)
            .field("status", &self.get_status())
            .finish_non_exhaustive()
    }
}

fn run_worker(shared: &Shared, stop: &AtomicBool, generation: u64) {
    let outcome = catch_unwind(AssertUnwindSafe(|| shared.run_loop(stop)));
    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.detail()),
        Err(payload) => Some(panic_message(payload.as_ref())),
    };
    // A detached worker must not clobber the status of its replacement.
    let current = shared.generation.load(Ordering::SeqCst) == generation;
    if let Some(message) = failure {
        tracing::error!(error = %message, "agent loop crashed");
        if current {
            shared.status.set_error(format!("loop_crash: {message}"));
        }
    }
    if current {
        shared.status.set_flags(false, true);
    }
    tracing::debug!(generation, "agent loop worker exited");
}

enum Gate {
    Proceed,
    Idle,
    Exit,
}

impl Shared {
    fn run_loop(&self, stop: &AtomicBool) -> AgentResult<()> {
        let mut step: u64 = 0;
        loop {
            match self.gate(stop) {
                Gate::Exit => return Ok(()),
                Gate::Idle => {
                    thread::sleep(self.config.idle_poll);
                    continue;
                }
                Gate::Proceed => {}
            }

            if !self.wait_for_budget(stop) {
                return Ok(());
            }

            let (state, events) = self.perceive(stop);
            let screenshot = match self.capture.capture() {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.isolate(stop, "capture_error", &err);
                    Vec::new()
                }
            };

            if !events.is_empty() {
                self.dispatch_events(&events, &state, &screenshot);
            }

            match self.gate(stop) {
                Gate::Exit => return Ok(()),
                Gate::Idle => {
                    thread::sleep(self.config.idle_poll);
                    continue;
                }
                Gate::Proceed => {}
            }

            let action = self.decide(stop, &screenshot, &state);
            tracing::debug!(step, kind = action.kind(), note = action.note(), "executing action");
            let action_value = action.to_value()?;
            let executed = self.execute(stop, &action);
            // Results of a call that outlived stop() belong to no live worker.
            if stop.load(Ordering::SeqCst) {
                return Ok(());
            }
            if executed {
                let mut budget = self.lock_budget();
                if budget.recent.len() >= RECENT_ACTIONS {
                    budget.recent.pop_front();
                }
                budget.recent.push_back(action_value.clone());
                budget.limiter.record(Instant::now());
            }

            if !screenshot.is_empty() {
                if let Err(err) = self
                    .recorder
                    .log_step(step, &state, &events, &action, &screenshot)
                {
                    self.isolate(stop, "persistence_error", &err);
                }
            }

            self.status.update(|status| {
                status.last_step = step;
                status.last_state = state;
                status.last_action = Some(action_value);
                status.last_action_t = Some(utc_now_rfc3339());
            });

            step += 1;
            if !sleep_unless_stopped(stop, self.config.step_delay, self.config.idle_poll) {
                return Ok(());
            }
        }
    }

    fn gate(&self, stop: &AtomicBool) -> Gate {
        if stop.load(Ordering::SeqCst) {
            Gate::Exit
        } else if self.paused.load(Ordering::SeqCst) {
            Gate::Idle
        } else {
            Gate::Proceed
        }
    }

    /// Block while the action budget is spent. Returns `false` if stopped.
    fn wait_for_budget(&self, stop: &AtomicBool) -> bool {
        let mut announced = false;
        loop {
            let wait = self.lock_budget().limiter.wait_time(Instant::now());
            let Some(wait) = wait else {
                return true;
            };
            if stop.load(Ordering::SeqCst) {
                return false;
            }
            if !announced {
                tracing::info!(sleep_ms = wait.as_millis(), "rate limit reached, sleeping");
                announced = true;
            }
            thread::sleep(wait.min(self.config.idle_poll));
        }
    }

    fn perceive(&self, stop: &AtomicBool) -> (Map<String, Value>, Vec<Map<String, Value>>) {
        let state = match self.bridge.fetch_state() {
            Ok(state) => state,
            Err(err) => {
                self.isolate(stop, "bridge_error", &err);
                return (Map::new(), Vec::new());
            }
        };
        match self.bridge.fetch_events() {
            Ok(events) => (state, events),
            Err(err) => {
                self.isolate(stop, "bridge_error", &err);
                (state, Vec::new())
            }
        }
    }

    fn dispatch_events(
        &self,
        events: &[Map<String, Value>],
        state: &Map<String, Value>,
        screenshot: &[u8],
    ) {
        let handler = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(handler) = handler else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| handler.dispatch(events, state, screenshot))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %err.detail(), "event handler failed");
            }
            Err(payload) => {
                tracing::warn!(panic = %panic_message(payload.as_ref()), "event handler panicked");
            }
        }
    }

    fn decide(
        &self,
        stop: &AtomicBool,
        screenshot: &[u8],
        state: &Map<String, Value>,
    ) -> Action {
        let recent: Vec<Value> = self.lock_budget().recent.iter().cloned().collect();
        let request = DecisionRequest {
            screenshot,
            state,
            recent_actions: &recent,
            rules_text: self.rules_text.as_deref(),
        };
        match self.decisions.decide(&request) {
            Ok(value) => match Action::from_value(value) {
                Ok(action) => action,
                Err(err) => {
                    self.isolate(stop, "schema_validation_error", &err);
                    Action::fallback("schema_validation_error")
                }
            },
            Err(err) => {
                self.isolate(stop, "decision_error", &err);
                Action::fallback("decision_error")
            }
        }
    }

    /// Run the action once. Returns whether it succeeded.
    fn execute(&self, stop: &AtomicBool, action: &Action) -> bool {
        let result = match action {
            Action::Buttons(buttons) => self
                .actuator
                .press_sequence(&buttons.buttons, buttons.wait_ms),
            Action::Wait(wait) => self.actuator.wait(wait.wait_ms),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                self.isolate(stop, "input_error", &err);
                thread::sleep(self.config.input_error_backoff);
                false
            }
        }
    }

    /// Log a per-step failure and surface it in `last_error` unless stopped.
    fn isolate(&self, stop: &AtomicBool, kind: &str, err: &AgentError) {
        let detail = err.detail();
        tracing::warn!(kind, code = %err.code, error = %detail, "step failure");
        if !stop.load(Ordering::SeqCst) {
            self.status.set_error(format!("{kind}: {detail}"));
        }
    }

    fn lock_budget(&self) -> MutexGuard<'_, Budget> {
        self.budget.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sleep `total` in slices of `slice`, bailing out early on stop.
fn sleep_unless_stopped(stop: &AtomicBool, total: Duration, slice: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(slice));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

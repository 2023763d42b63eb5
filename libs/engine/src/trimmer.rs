use crate::bind::find_conversation_root;
use crate::collect::{CandidateCollector, CollectorConfig};
use crate::error::EngineError;
use crate::executor;
use crate::streaming::is_streaming;
use crate::thread::build_thread;
use crate::types::{
    BuildMode, EngineCommand, EngineEvent, EnginePolicy, MessageDescriptor, Phase, SkipReason,
    SpeedMode, TrimmerState,
};
use slimthread_page::{MutationRecord, ObserverConfig, SharedDom};
use slimthread_shared::{Settings, StatusReport};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Attributes worth waking up for: role markers, identity, hidden state.
const OBSERVED_ATTRIBUTES: &[&str] = &[
    "data-message-author-role",
    "data-author",
    "data-role",
    "data-turn",
    "data-message-id",
    "id",
    "hidden",
    "aria-hidden",
];

fn standard_observer_config() -> ObserverConfig {
    ObserverConfig {
        subtree: true,
        child_list: true,
        attribute_filter: OBSERVED_ATTRIBUTES
            .iter()
            .map(|name| name.to_string())
            .collect(),
    }
}

/// The trim decision engine. Owns the state machine (`Idle`/`Observing`),
/// the speed mode, and the evaluation pipeline; driven by `run()`, which
/// multiplexes page mutations, host commands, and the fast-mode deadline.
pub struct TrimEngine {
    dom: SharedDom,
    policy: EnginePolicy,
    collector: CandidateCollector,
    state: TrimmerState,
    binding_id: Uuid,
    events: mpsc::UnboundedSender<EngineEvent>,
    mutations: Option<mpsc::UnboundedReceiver<MutationRecord>>,
}

enum LoopStep {
    Cancelled,
    Command(Option<EngineCommand>),
    Mutation(Option<MutationRecord>),
    FastDeadline,
}

impl TrimEngine {
    pub fn new(
        dom: SharedDom,
        policy: EnginePolicy,
        settings: Settings,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let collector = CandidateCollector::new(CollectorConfig {
            cache_ttl: policy.collector_cache_ttl,
            ..CollectorConfig::default()
        });
        Self {
            dom,
            policy,
            collector,
            state: TrimmerState::idle(settings.validated()),
            binding_id: Uuid::new_v4(),
            events,
            mutations: None,
        }
    }

    pub fn state(&self) -> &TrimmerState {
        &self.state
    }

    /// `Idle -> Observing`. Locates the conversation root, attaches the
    /// observer, and enters fast mode with a fresh first-trim latch. A
    /// fallback-root binding is reported as degraded, never silent. Failing
    /// to attach at all leaves the engine `Idle` (fail-closed).
    pub fn boot(&mut self) {
        if self.state.phase == Phase::Observing {
            self.shutdown();
        }
        self.binding_id = Uuid::new_v4();
        self.collector.invalidate();

        let binding = self.dom.with(|page| find_conversation_root(page));
        let root = binding.node();
        let observed = self
            .dom
            .with(|page| page.observe(root, standard_observer_config()));
        let (handle, receiver) = match observed {
            Ok(pair) => pair,
            Err(error) => {
                tracing::warn!(%error, "could not attach observer, staying idle");
                self.state = TrimmerState::idle(self.state.settings.clone());
                return;
            }
        };

        self.mutations = Some(receiver);
        self.state = TrimmerState {
            phase: Phase::Observing,
            observer: Some(handle),
            trim_pending: false,
            last_trim_at: None,
            conversation_root: Some(root),
            root_is_fallback: binding.is_fallback(),
            settings: self.state.settings.clone(),
            speed_mode: SpeedMode::Fast,
            fast_mode_started: Some(Instant::now()),
            first_trim_done: false,
        };

        self.emit(EngineEvent::Bound {
            binding_id: self.binding_id,
            degraded: binding.is_fallback(),
        });
        if binding.is_fallback() {
            self.emit(EngineEvent::LayoutNotRecognized {
                binding_id: self.binding_id,
            });
        }
    }

    /// `* -> Idle`. Everything is reset except the settings snapshot, which
    /// survives a shutdown/reboot cycle.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.state.observer.take() {
            self.dom.with(|page| {
                if let Err(error) = page.drop_observer(handle) {
                    tracing::debug!(%error, "observer already gone at shutdown");
                }
            });
        }
        self.mutations = None;
        self.collector.invalidate();
        self.state = TrimmerState::idle(self.state.settings.clone());
    }

    /// Drive the engine until cancelled or the command channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        cancel: CancellationToken,
    ) {
        if self.state.phase == Phase::Idle {
            self.boot();
        }
        if self.state.phase == Phase::Observing {
            // Pre-paint pass: trim before the host paints the full history.
            self.trim_cycle().await;
        }

        loop {
            self.maybe_enter_steady();

            let fast_deadline = match (self.state.speed_mode, self.state.fast_mode_started) {
                (SpeedMode::Fast, Some(started)) => Some(tokio::time::Instant::from_std(
                    started + self.policy.fast_mode_max,
                )),
                _ => None,
            };
            let mut mutations = self.mutations.take();

            let step = tokio::select! {
                _ = cancel.cancelled() => LoopStep::Cancelled,
                command = commands.recv() => LoopStep::Command(command),
                record = recv_or_pending(&mut mutations) => LoopStep::Mutation(record),
                _ = sleep_until_or_pending(fast_deadline) => LoopStep::FastDeadline,
            };
            self.mutations = mutations;

            match step {
                LoopStep::Cancelled | LoopStep::Command(None) => {
                    self.shutdown();
                    self.emit(EngineEvent::Stopped {
                        binding_id: self.binding_id,
                    });
                    return;
                }
                LoopStep::Command(Some(command)) => self.handle_command(command).await,
                LoopStep::Mutation(Some(_)) => self.trim_cycle().await,
                LoopStep::Mutation(None) => {
                    // The observer registration vanished under us; rebinding
                    // is the caller's call, operating blind is not an option.
                    tracing::warn!("mutation channel closed, leaving observing state");
                    self.shutdown();
                }
                LoopStep::FastDeadline => self.enter_steady("fast window elapsed"),
            }
        }
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SettingsChanged(settings) => {
                let settings = settings.validated();
                let keep_changed = settings.keep_count != self.state.settings.keep_count;
                let re_enabled = settings.enabled && !self.state.settings.enabled;
                self.state.settings = settings;
                // A tighter budget or a re-enable can surface overflow that
                // no mutation will announce.
                if (keep_changed || re_enabled) && self.state.phase == Phase::Observing {
                    self.trim_cycle().await;
                }
            }
            EngineCommand::Rebind => {
                self.boot();
                if self.state.phase == Phase::Observing {
                    self.trim_cycle().await;
                }
            }
            EngineCommand::Shutdown => self.shutdown(),
        }
    }

    /// One scheduled trim: wait out the speed mode's scheduling delay, then
    /// evaluate under the settings snapshot taken at schedule time. The
    /// pending flag is cleared on every path out, including errors, so it
    /// can never wedge.
    async fn trim_cycle(&mut self) {
        if self.state.phase != Phase::Observing || self.state.trim_pending {
            return;
        }
        if !self.state.settings.enabled {
            return;
        }

        self.state.trim_pending = true;
        // This snapshot is what the trim evaluates against, even if settings
        // change before the debounce elapses.
        let snapshot = self.state.settings.clone();

        match self.state.speed_mode {
            SpeedMode::Fast => tokio::task::yield_now().await,
            SpeedMode::Steady => {
                tokio::time::sleep(self.policy.debounce).await;
                self.drain_mutations();
                // A debounced wake means the document changed; the short
                // collector cache only serves burst triggers within one tick.
                self.collector.invalidate();
            }
        }

        let executed = match self.evaluate_trim(&snapshot).await {
            Ok(executed) => executed,
            Err(error) => {
                tracing::error!(%error, "trim evaluation failed, nothing trimmed this cycle");
                false
            }
        };
        self.state.trim_pending = false;
        self.maybe_enter_steady();

        if executed {
            // Deferred completion pass: catch mutations that landed while
            // the observer was disconnected during execution. Not chained
            // further; a quiet document makes this a no-op.
            tokio::task::yield_now().await;
            let snapshot = self.state.settings.clone();
            self.state.trim_pending = true;
            if let Err(error) = self.evaluate_trim(&snapshot).await {
                tracing::error!(%error, "follow-up evaluation failed");
            }
            self.state.trim_pending = false;
        }
    }

    /// The core decision function. Gates in order: enabled, not streaming
    /// (skipped in fast mode), thread at or above the floor. Each failed
    /// gate aborts back to observing. Returns whether anything was executed.
    async fn evaluate_trim(&mut self, snapshot: &Settings) -> Result<bool, EngineError> {
        let root = self
            .state
            .conversation_root
            .ok_or(EngineError::RootNotFound)?;

        if !snapshot.enabled {
            self.emit(EngineEvent::EvaluationSkipped {
                binding_id: self.binding_id,
                reason: SkipReason::Disabled,
            });
            return Ok(false);
        }

        let mode = self.state.speed_mode;
        if mode == SpeedMode::Steady && self.dom.with(|page| is_streaming(page, root)) {
            self.emit(EngineEvent::EvaluationSkipped {
                binding_id: self.binding_id,
                reason: SkipReason::Streaming,
            });
            return Ok(false);
        }

        let now = Instant::now();
        let build_mode = BuildMode::for_speed(mode);
        let collector = &mut self.collector;
        let policy = &self.policy;
        let descriptors = self
            .dom
            .with(|page| build_thread(collector, page, root, build_mode, policy, now));

        if descriptors.is_empty() {
            self.emit(EngineEvent::EvaluationSkipped {
                binding_id: self.binding_id,
                reason: SkipReason::BelowFloor,
            });
            return Ok(false);
        }

        let total = descriptors.len();
        let keep = snapshot.keep_count as usize;
        if total <= keep {
            self.emit(EngineEvent::Status {
                binding_id: self.binding_id,
                report: StatusReport::no_op(total, snapshot.keep_count),
            });
            return Ok(false);
        }

        let overflow = total - keep;
        // Oldest first: order keys ascend with document order.
        let mut to_remove: Vec<MessageDescriptor> =
            descriptors.into_iter().take(overflow).collect();
        if snapshot.preserve_hidden_roles {
            to_remove.retain(|descriptor| !descriptor.role.is_hidden());
        }
        if to_remove.is_empty() {
            self.emit(EngineEvent::Status {
                binding_id: self.binding_id,
                report: StatusReport::no_op(total, snapshot.keep_count),
            });
            return Ok(false);
        }

        let observer = self.state.observer.ok_or(EngineError::NotObserving)?;
        let execution = executor::execute(&self.dom, observer, to_remove, mode, &self.policy).await;
        // Our own writes made the cached collection stale.
        self.collector.invalidate();

        if execution.removed > 0 {
            self.state.first_trim_done = true;
            self.state.last_trim_at = Some(Instant::now());
        }

        let report = StatusReport {
            total_before: total,
            kept_after: total - execution.removed,
            removed: execution.removed,
            limit: snapshot.keep_count,
        };
        self.emit(EngineEvent::TrimCompleted {
            binding_id: self.binding_id,
            report,
            execution,
        });
        Ok(execution.removed > 0)
    }

    fn maybe_enter_steady(&mut self) {
        if self.state.phase != Phase::Observing || self.state.speed_mode != SpeedMode::Fast {
            return;
        }
        let window_elapsed = self
            .state
            .fast_mode_started
            .is_some_and(|started| started.elapsed() >= self.policy.fast_mode_max);
        if self.state.first_trim_done {
            self.enter_steady("first trim done");
        } else if window_elapsed {
            self.enter_steady("fast window elapsed");
        }
    }

    /// Fast -> Steady: swap the microtask-driven observer for a debounced
    /// one with identical scope and filter configuration.
    fn enter_steady(&mut self, reason: &str) {
        if self.state.phase != Phase::Observing || self.state.speed_mode == SpeedMode::Steady {
            return;
        }
        let Some(root) = self.state.conversation_root else {
            return;
        };

        let previous = self.state.observer.take();
        let config = self
            .dom
            .with(|page| previous.and_then(|handle| page.observer_config(handle).cloned()))
            .unwrap_or_else(standard_observer_config);
        if let Some(handle) = previous {
            self.dom.with(|page| {
                if let Err(error) = page.drop_observer(handle) {
                    tracing::debug!(%error, "fast observer already gone");
                }
            });
        }

        match self.dom.with(|page| page.observe(root, config)) {
            Ok((handle, receiver)) => {
                self.state.observer = Some(handle);
                self.mutations = Some(receiver);
            }
            Err(error) => {
                tracing::warn!(%error, "could not reattach observer, shutting down");
                self.shutdown();
                return;
            }
        }

        self.state.speed_mode = SpeedMode::Steady;
        self.state.fast_mode_started = None;
        tracing::debug!(reason, "entering steady mode");
        self.emit(EngineEvent::SpeedModeChanged {
            binding_id: self.binding_id,
            mode: SpeedMode::Steady,
        });
    }

    fn drain_mutations(&mut self) {
        if let Some(receiver) = &mut self.mutations {
            while receiver.try_recv().is_ok() {}
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

async fn recv_or_pending(
    receiver: &mut Option<mpsc::UnboundedReceiver<MutationRecord>>,
) -> Option<MutationRecord> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_or_pending(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

use serde::{Deserialize, Serialize};
use slimthread_page::NodeId;
use slimthread_shared::{Role, Settings, StatusReport};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Tuned thresholds. These are configuration, not protocol: the defaults were
/// calibrated against one host UI and are expected to be retuned per target.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    /// Below this many classified descriptors the signal is too noisy to act on.
    pub min_thread_len: usize,
    /// How long the engine stays in fast mode after boot at most.
    pub fast_mode_max: Duration,
    /// Steady-mode debounce window coalescing mutation bursts.
    pub debounce: Duration,
    /// Maximum removals per steady-mode executor step.
    pub batch_size: usize,
    /// Wall-clock budget for one synchronous executor step.
    pub step_budget: Duration,
    /// How long a collector result stays valid across evaluation triggers.
    pub collector_cache_ttl: Duration,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            min_thread_len: 6,
            fast_mode_max: Duration::from_secs(3),
            debounce: Duration::from_millis(250),
            batch_size: 8,
            step_budget: Duration::from_millis(16),
            collector_cache_ttl: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedMode {
    /// Active right after (re)binding: evaluation runs before the next paint,
    /// no debounce, streaming gate skipped.
    Fast,
    /// Stabilized operation: debounced evaluation, batched execution.
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Observing,
}

/// Thread-builder accuracy. `Fast` must never perform a layout-dependent
/// read; it is the only mode allowed on the pre-paint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Fast,
    Accurate,
}

impl BuildMode {
    pub fn for_speed(mode: SpeedMode) -> Self {
        match mode {
            SpeedMode::Fast => BuildMode::Fast,
            SpeedMode::Steady => BuildMode::Accurate,
        }
    }
}

/// One message-bearing element, as seen during a single evaluation pass.
/// The node handle is weak: descriptors are rebuilt from the document on
/// every pass and must never be retained across passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub node: NodeId,
    pub role: Role,
    pub stable_id: String,
    /// Document-order index within the filtered candidate list. Strictly
    /// increasing within one pass. Geometric position is never consulted.
    pub order_key: usize,
    pub visible: bool,
}

/// The decision engine's memory for one bound conversation root. Discarded
/// and rebuilt whenever the root changes or the engine shuts down; only the
/// settings snapshot survives a shutdown/reboot cycle.
#[derive(Debug)]
pub struct TrimmerState {
    pub phase: Phase,
    pub observer: Option<slimthread_page::ObserverHandle>,
    pub trim_pending: bool,
    pub last_trim_at: Option<Instant>,
    pub conversation_root: Option<NodeId>,
    pub root_is_fallback: bool,
    pub settings: Settings,
    pub speed_mode: SpeedMode,
    pub fast_mode_started: Option<Instant>,
    /// One-shot latch: set on the first successful trim, read only by the
    /// fast-to-steady transition, reset at boot.
    pub first_trim_done: bool,
}

impl TrimmerState {
    pub fn idle(settings: Settings) -> Self {
        Self {
            phase: Phase::Idle,
            observer: None,
            trim_pending: false,
            last_trim_at: None,
            conversation_root: None,
            root_is_fallback: false,
            settings,
            speed_mode: SpeedMode::Fast,
            fast_mode_started: None,
            first_trim_done: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// A fresh validated settings snapshot from the bridge.
    SettingsChanged(Settings),
    /// SPA navigation: re-locate the conversation root and rebind.
    Rebind,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    Streaming,
    BelowFloor,
}

/// What one executor invocation actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub removed: usize,
    pub failed: usize,
    pub steps: usize,
    pub yields: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    Bound {
        binding_id: Uuid,
        degraded: bool,
    },
    /// The conversation layout could not be recognized; the engine is bound
    /// to a fallback root and operating in a degraded state.
    LayoutNotRecognized {
        binding_id: Uuid,
    },
    EvaluationSkipped {
        binding_id: Uuid,
        reason: SkipReason,
    },
    Status {
        binding_id: Uuid,
        report: StatusReport,
    },
    TrimCompleted {
        binding_id: Uuid,
        report: StatusReport,
        execution: ExecutionReport,
    },
    SpeedModeChanged {
        binding_id: Uuid,
        mode: SpeedMode,
    },
    Stopped {
        binding_id: Uuid,
    },
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration;

/// Event loop backend selection (spec §4.2/§6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    CrossPlatform,
    ReadinessLinux,
    CompletionLinux,
    Custom,
    UserProvided,
}

/// Scheduler placement policy selection (spec §4.3/§6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Fifo,
    Priority,
    #[default]
    WorkStealing,
    Affinity,
    RoundRobin,
    Custom,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AffinityMode {
    #[default]
    None,
    RoundRobin,
    NumaAware,
    Custom,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub backend: BackendKind,
    pub strategy: StrategyKind,
    pub worker_threads: usize,
    pub max_tasks_per_loop: usize,
    #[serde(with = "duration")]
    pub idle_timeout: Duration,
    /// Per-worker queue depth above which `Scheduler::spawn` fails fast with
    /// `Error::Backpressure` instead of queuing unboundedly (spec §5/§8#7).
    /// `None` means unbounded.
    pub max_queue_len: Option<usize>,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            strategy: StrategyKind::default(),
            worker_threads: num_cpus::get().max(1),
            max_tasks_per_loop: 256,
            idle_timeout: Duration::from_millis(50),
            max_queue_len: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkStealingSection {
    pub enabled: bool,
    pub steal_threshold: usize,
    #[serde(with = "duration")]
    pub steal_interval: Duration,
    pub max_steal_attempts: usize,
    pub max_tasks_per_steal: usize,
    #[serde(with = "duration")]
    pub min_steal_interval: Duration,
    #[serde(with = "duration")]
    pub max_steal_interval: Duration,
}

impl Default for WorkStealingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            steal_threshold: 2,
            steal_interval: Duration::from_millis(5),
            max_steal_attempts: 4,
            max_tasks_per_steal: 32,
            min_steal_interval: Duration::from_millis(1),
            max_steal_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinitySection {
    pub mode: AffinityMode,
    pub worker_core_map: Vec<(usize, usize)>,
    pub excluded_cores: Vec<usize>,
    pub isolate_main_thread: bool,
    pub numa_node_assignments: Vec<(usize, u32)>,
}

/// Durability policy for journal appends (spec §4.4): `Strong` blocks the
/// handler dispatch until the backend's sync is complete; `Fast` lets
/// durability lag by up to `sync_interval`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    #[default]
    Strong,
    Fast,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    pub enabled: bool,
    pub backend: String,
    pub path: String,
    pub sync_mode: SyncMode,
    #[serde(with = "duration")]
    pub sync_interval: Duration,
    pub max_attempts: u32,
    #[serde(with = "duration")]
    pub hook_timeout: Duration,
    #[serde(with = "duration")]
    pub max_recovery_age: Duration,
    #[serde(with = "duration")]
    pub retry_backoff: Duration,
    pub backoff_multiplier: f64,
    #[serde(with = "duration")]
    pub max_retry_delay: Duration,
    #[serde(with = "duration")]
    pub idempotency_window: Duration,
    pub max_idempotency_entries: usize,
    pub excluded_methods: Vec<String>,
    pub excluded_path_patterns: Vec<String>,
    pub excluded_content_types: Vec<String>,
    pub min_body_size: usize,
    pub max_body_size: usize,
    pub idempotency_header: Option<String>,
    pub fallback_to_basic: bool,
    /// Resolves spec Open Question #1: whether recovery resumes `pending`
    /// (handler never started) entries in addition to `in_flight` ones.
    /// Default `true` enables both paths, per spec.md's instruction that the
    /// choice be configurable rather than hard-coded.
    pub resume_pending_requests: bool,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: "mmap".to_string(),
            path: "./stellane-journal".to_string(),
            sync_mode: SyncMode::Strong,
            sync_interval: Duration::from_millis(100),
            max_attempts: 5,
            hook_timeout: Duration::from_secs(30),
            max_recovery_age: Duration::from_secs(3600),
            retry_backoff: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(60),
            idempotency_window: Duration::from_secs(300),
            max_idempotency_entries: 10_000,
            excluded_methods: vec!["GET".to_string(), "HEAD".to_string(), "OPTIONS".to_string()],
            excluded_path_patterns: Vec::new(),
            excluded_content_types: Vec::new(),
            min_body_size: 0,
            max_body_size: 16 * 1024 * 1024,
            idempotency_header: Some("Idempotency-Key".to_string()),
            fallback_to_basic: true,
            resume_pending_requests: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalRotationSection {
    pub max_file_size: u64,
    pub max_files: usize,
    pub compress_old_files: bool,
    #[serde(with = "duration")]
    pub max_file_age: Duration,
}

impl Default for JournalRotationSection {
    fn default() -> Self {
        Self {
            max_file_size: 64 * 1024 * 1024,
            max_files: 8,
            compress_old_files: false,
            max_file_age: Duration::from_secs(24 * 3600),
        }
    }
}

/// Top-level configuration, mirroring spec §6's option groups. Loading from
/// TOML and applying `STELLANE_*` environment overrides is implemented in
/// `stellane-runtime::config` (out of this crate's scope — this crate only
/// defines the shape).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub runtime: RuntimeSection,
    pub work_stealing: WorkStealingSection,
    pub affinity: AffinitySection,
    pub recovery: RecoverySection,
    pub journal_rotation: JournalRotationSection,
    pub max_connections: Option<usize>,
    pub max_recoveries_per_second: Option<u32>,
}

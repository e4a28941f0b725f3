//! Configuration loading (spec §6): TOML on disk, then a `STELLANE_<KEY>`
//! environment override pass layered on top. Parsing itself doesn't touch the
//! scheduler/journal's correctness contract; it only produces the
//! `RuntimeConfig` those subsystems consume.

use std::path::Path;

use stellane_types::config::{AffinityMode, BackendKind, StrategyKind, SyncMode};
use stellane_types::{RuntimeConfig, duration};

use crate::error::{Error, Result};

pub fn from_file(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.display().to_string(),
        source,
    })?;
    from_toml(&text)
}

pub fn from_toml(text: &str) -> Result<RuntimeConfig> {
    let mut config: RuntimeConfig = toml::from_str(text)?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Applies `STELLANE_<SECTION>_<KEY>` environment overrides on top of an
/// already-loaded config. Covers the knobs an operator actually tunes at
/// deploy time; every field remains reachable from the TOML file itself.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<()> {
    for (key, value) in std::env::vars() {
        let Some(rest) = key.strip_prefix("STELLANE_") else {
            continue;
        };
        apply_one(config, rest, &value).map_err(|reason| Error::EnvOverride {
            key: key.clone(),
            value: value.clone(),
            reason,
        })?;
    }
    Ok(())
}

fn apply_one(config: &mut RuntimeConfig, key: &str, value: &str) -> std::result::Result<(), String> {
    match key {
        "RUNTIME_BACKEND" => config.runtime.backend = parse_backend(value)?,
        "RUNTIME_STRATEGY" => config.runtime.strategy = parse_strategy(value)?,
        "RUNTIME_WORKER_THREADS" => config.runtime.worker_threads = parse_usize(value)?,
        "RUNTIME_MAX_TASKS_PER_LOOP" => config.runtime.max_tasks_per_loop = parse_usize(value)?,
        "RUNTIME_IDLE_TIMEOUT" => config.runtime.idle_timeout = parse_duration(value)?,
        "RUNTIME_MAX_QUEUE_LEN" => config.runtime.max_queue_len = Some(parse_usize(value)?),

        "WORK_STEALING_ENABLED" => config.work_stealing.enabled = parse_bool(value)?,
        "WORK_STEALING_STEAL_THRESHOLD" => {
            config.work_stealing.steal_threshold = parse_usize(value)?
        }
        "WORK_STEALING_STEAL_INTERVAL" => {
            config.work_stealing.steal_interval = parse_duration(value)?
        }
        "WORK_STEALING_MAX_STEAL_ATTEMPTS" => {
            config.work_stealing.max_steal_attempts = parse_usize(value)?
        }

        "AFFINITY_MODE" => config.affinity.mode = parse_affinity_mode(value)?,
        "AFFINITY_ISOLATE_MAIN_THREAD" => {
            config.affinity.isolate_main_thread = parse_bool(value)?
        }

        "RECOVERY_ENABLED" => config.recovery.enabled = parse_bool(value)?,
        "RECOVERY_BACKEND" => config.recovery.backend = value.to_string(),
        "RECOVERY_PATH" => config.recovery.path = value.to_string(),
        "RECOVERY_SYNC_MODE" => config.recovery.sync_mode = parse_sync_mode(value)?,
        "RECOVERY_SYNC_INTERVAL" => config.recovery.sync_interval = parse_duration(value)?,
        "RECOVERY_MAX_ATTEMPTS" => config.recovery.max_attempts = parse_u32(value)?,
        "RECOVERY_HOOK_TIMEOUT" => config.recovery.hook_timeout = parse_duration(value)?,
        "RECOVERY_MAX_RECOVERY_AGE" => config.recovery.max_recovery_age = parse_duration(value)?,
        "RECOVERY_RETRY_BACKOFF" => config.recovery.retry_backoff = parse_duration(value)?,
        "RECOVERY_MAX_RETRY_DELAY" => config.recovery.max_retry_delay = parse_duration(value)?,
        "RECOVERY_RESUME_PENDING_REQUESTS" => {
            config.recovery.resume_pending_requests = parse_bool(value)?
        }

        "JOURNAL_ROTATION_MAX_FILE_SIZE" => {
            config.journal_rotation.max_file_size = value
                .parse()
                .map_err(|_| format!("{value:?} is not a valid u64"))?
        }
        "JOURNAL_ROTATION_MAX_FILES" => config.journal_rotation.max_files = parse_usize(value)?,

        "MAX_CONNECTIONS" => config.max_connections = Some(parse_usize(value)?),
        "MAX_RECOVERIES_PER_SECOND" => config.max_recoveries_per_second = Some(parse_u32(value)?),

        _ => return Err(format!("unrecognized config key {key:?}")),
    }
    Ok(())
}

fn parse_usize(value: &str) -> std::result::Result<usize, String> {
    value.parse().map_err(|_| format!("{value:?} is not a valid integer"))
}

fn parse_u32(value: &str) -> std::result::Result<u32, String> {
    value.parse().map_err(|_| format!("{value:?} is not a valid integer"))
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("{other:?} is not a valid boolean")),
    }
}

fn parse_duration(value: &str) -> std::result::Result<std::time::Duration, String> {
    duration::parse(value).map_err(|e| e.to_string())
}

fn parse_backend(value: &str) -> std::result::Result<BackendKind, String> {
    match value {
        "cross-platform" => Ok(BackendKind::CrossPlatform),
        "readiness-linux" => Ok(BackendKind::ReadinessLinux),
        "completion-linux" => Ok(BackendKind::CompletionLinux),
        "custom" => Ok(BackendKind::Custom),
        "user-provided" => Ok(BackendKind::UserProvided),
        other => Err(format!("unknown backend kind {other:?}")),
    }
}

fn parse_strategy(value: &str) -> std::result::Result<StrategyKind, String> {
    match value {
        "fifo" => Ok(StrategyKind::Fifo),
        "priority" => Ok(StrategyKind::Priority),
        "work-stealing" => Ok(StrategyKind::WorkStealing),
        "affinity" => Ok(StrategyKind::Affinity),
        "round-robin" => Ok(StrategyKind::RoundRobin),
        "custom" => Ok(StrategyKind::Custom),
        other => Err(format!("unknown strategy kind {other:?}")),
    }
}

fn parse_affinity_mode(value: &str) -> std::result::Result<AffinityMode, String> {
    match value {
        "none" => Ok(AffinityMode::None),
        "round-robin" => Ok(AffinityMode::RoundRobin),
        "numa-aware" => Ok(AffinityMode::NumaAware),
        "custom" => Ok(AffinityMode::Custom),
        other => Err(format!("unknown affinity mode {other:?}")),
    }
}

fn parse_sync_mode(value: &str) -> std::result::Result<SyncMode, String> {
    match value {
        "strong" => Ok(SyncMode::Strong),
        "fast" => Ok(SyncMode::Fast),
        other => Err(format!("unknown sync mode {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.runtime.worker_threads, RuntimeConfig::default().runtime.worker_threads);
    }

    #[test]
    fn toml_overrides_section_fields() {
        let config = from_toml(
            r#"
            [runtime]
            worker_threads = 4
            strategy = "fifo"
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.worker_threads, 4);
        assert_eq!(config.runtime.strategy, StrategyKind::Fifo);
    }

    #[test]
    fn env_override_wins_over_toml_value() {
        let mut config = from_toml("[runtime]\nworker_threads = 4\n").unwrap();
        // SAFETY: test runs single-threaded within this process's test harness
        // for this variable; no other test reads STELLANE_RUNTIME_WORKER_THREADS.
        unsafe { std::env::set_var("STELLANE_RUNTIME_WORKER_THREADS", "9") };
        apply_env_overrides(&mut config).unwrap();
        unsafe { std::env::remove_var("STELLANE_RUNTIME_WORKER_THREADS") };
        assert_eq!(config.runtime.worker_threads, 9);
    }

    #[test]
    fn rejects_unrecognized_override_key() {
        let mut config = RuntimeConfig::default();
        let err = apply_one(&mut config, "NOT_A_REAL_KEY", "1");
        assert!(err.is_err());
    }
}

use crate::models::{JobLifecycleState, StatusSnapshot};

/// Classify a raw stats payload into a lifecycle state.
///
/// `finished` wins over everything, a non-empty `error` wins over the raw
/// state string, and any raw state outside the known set is treated as
/// `Errored` so an unknown backend state never renders as progress.
pub fn classify(snapshot: &StatusSnapshot) -> JobLifecycleState {
    if snapshot.finished {
        return JobLifecycleState::Finished;
    }
    if snapshot
        .error
        .as_deref()
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .is_some()
    {
        return JobLifecycleState::Errored;
    }
    match snapshot.state.trim().to_ascii_lowercase().as_str() {
        "initializing" => JobLifecycleState::Initializing,
        "live" => JobLifecycleState::Live,
        "paused" => JobLifecycleState::Paused,
        _ => JobLifecycleState::Errored,
    }
}

/// True exactly once per job: on the first snapshot that reports `finished`
/// while the previous state was anything else. This is the sole trigger for
/// recording a completion.
pub fn is_newly_finished(previous: JobLifecycleState, snapshot: &StatusSnapshot) -> bool {
    snapshot.finished && previous != JobLifecycleState::Finished
}

/// Percent complete, clamped to `[0, 100]`. A missing or zero total yields
/// `0.0` rather than `NaN`.
pub fn progress_percent(progress_bytes: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 {
        return 0.0;
    }
    ((progress_bytes as f64 / total_bytes as f64) * 100.0).clamp(0.0, 100.0)
}

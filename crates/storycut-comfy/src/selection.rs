//! Model-selection fallback ladders.
//!
//! Pure functions: the orchestrator maps each choice to the appropriate
//! warning event. A missing-but-substitutable model never hard-fails a run.

/// Adapter family substring used by the substitution ladder.
const ADAPTER_FAMILY: &str = "sdxl";
/// Preferred variant marker within the family.
const ADAPTER_VARIANT: &str = "plus";

/// Outcome of checkpoint resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointChoice {
    /// The configured model is available.
    Configured,
    /// The configured model is absent; use this substitute.
    Fallback(String),
    /// The inventory is empty; keep the configured name and let the backend
    /// decide.
    Unverified,
}

/// Resolve the checkpoint to use for a run.
pub fn select_checkpoint(configured: &str, available: &[String]) -> CheckpointChoice {
    if available.is_empty() {
        return CheckpointChoice::Unverified;
    }
    if available.iter().any(|m| m == configured) {
        return CheckpointChoice::Configured;
    }
    CheckpointChoice::Fallback(available[0].clone())
}

/// Outcome of adapter resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterChoice {
    /// The configured adapter is available.
    Configured,
    /// A compatible adapter was substituted.
    Substitute(String),
    /// No compatible adapter exists; the reference feature is disabled.
    Unavailable,
}

/// Resolve the adapter with a three-tier preference ladder:
/// exact configured name, then family + preferred variant, then any family
/// match, then unavailable.
pub fn select_adapter(configured: &str, available: &[String]) -> AdapterChoice {
    if available.iter().any(|m| m == configured) {
        return AdapterChoice::Configured;
    }

    let family_plus = available.iter().find(|m| {
        let lower = m.to_lowercase();
        lower.contains(ADAPTER_FAMILY) && lower.contains(ADAPTER_VARIANT)
    });
    if let Some(name) = family_plus {
        return AdapterChoice::Substitute(name.clone());
    }

    let family_any = available
        .iter()
        .find(|m| m.to_lowercase().contains(ADAPTER_FAMILY));
    if let Some(name) = family_any {
        return AdapterChoice::Substitute(name.clone());
    }

    AdapterChoice::Unavailable
}

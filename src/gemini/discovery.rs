//! Model candidate discovery and ranking.

use std::collections::HashSet;

use tracing::{info, warn};

use super::client::GeminiClient;
use super::types::ModelCandidate;

/// Known-good model names, best first.
pub const PREFERRED_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-1.5-flash",
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro",
    "gemini-1.5-pro-latest",
    "gemini-pro",
    "gemini-1.0-pro",
];

/// Used when discovery fails or yields nothing.
pub fn fallback_candidates() -> Vec<ModelCandidate> {
    vec![
        ModelCandidate::new("v1beta", "gemini-1.5-flash"),
        ModelCandidate::new("v1beta", "gemini-pro"),
        ModelCandidate::new("v1", "gemini-pro"),
    ]
}

/// Rank discovered candidates by [`PREFERRED_MODELS`].
///
/// Preferred models come first in priority order (ties keep discovery order,
/// so earlier API versions win); unranked models follow in discovery order.
/// Duplicates are dropped.
pub fn rank_candidates(discovered: Vec<ModelCandidate>) -> Vec<ModelCandidate> {
    let mut seen = HashSet::new();
    let mut unique: Vec<ModelCandidate> = discovered
        .into_iter()
        .filter(|c| seen.insert(c.clone()))
        .collect();

    // Stable sort keeps discovery order within equal ranks.
    unique.sort_by_key(|c| {
        PREFERRED_MODELS
            .iter()
            .position(|m| *m == c.model_name)
            .unwrap_or(PREFERRED_MODELS.len())
    });
    unique
}

/// Query every API version for generation-capable models and rank them.
///
/// Never fails: an empty or failed discovery falls back to
/// [`fallback_candidates`].
pub async fn list_available_candidates(
    client: &GeminiClient,
    api_versions: &[String],
) -> Vec<ModelCandidate> {
    let mut discovered = Vec::new();

    for version in api_versions {
        match client.list_models(version).await {
            Ok(models) => {
                discovered.extend(
                    models
                        .iter()
                        .filter(|m| m.supports_generation())
                        .map(|m| ModelCandidate::new(version.clone(), m.short_name())),
                );
            }
            Err(e) => {
                warn!(api_version = %version, error = %e, "Model listing failed");
            }
        }
    }

    if discovered.is_empty() {
        warn!("No generation-capable models discovered, using fallback list");
        return fallback_candidates();
    }

    let ranked = rank_candidates(discovered);
    info!(
        count = ranked.len(),
        first = %ranked[0],
        "Model candidates discovered"
    );
    ranked
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::job::job_graph::JobVertex;
use crate::domain::job::resource_requirements::JobResourceRequirements;
use crate::domain::utils::id::JobVertexId;

pub const MAX_PARALLELISM_LOWER_BOUND: u32 = 1 << 7;
pub const MAX_PARALLELISM_UPPER_BOUND: u32 = 1 << 15;

/// Returns `Some(reason)` if the proposed max parallelism must be rejected.
pub type MaxParallelismValidator = Arc<dyn Fn(u32) -> Option<String> + Send + Sync>;

/// Parallelism bounds of one vertex plus the rule deciding how its max parallelism may change.
#[derive(Clone)]
pub struct VertexParallelismInformation {
    min_parallelism: u32,
    parallelism: u32,
    max_parallelism: u32,
    validator: MaxParallelismValidator,
}

impl VertexParallelismInformation {
    pub fn new(min_parallelism: u32, parallelism: u32, max_parallelism: u32, validator: MaxParallelismValidator) -> Self {
        VertexParallelismInformation { min_parallelism, parallelism, max_parallelism, validator }
    }

    pub fn min_parallelism(&self) -> u32 {
        self.min_parallelism
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn max_parallelism(&self) -> u32 {
        self.max_parallelism
    }

    /// Same bounds and validator, different current parallelism.
    pub fn with_parallelism(&self, parallelism: u32) -> Self {
        VertexParallelismInformation { parallelism, ..self.clone() }
    }

    /// Same bounds, with the max parallelism and validator of `baseline`.
    pub fn with_max_parallelism_of(&self, baseline: &VertexParallelismInformation) -> Self {
        VertexParallelismInformation { max_parallelism: baseline.max_parallelism, validator: baseline.validator.clone(), ..self.clone() }
    }

    pub fn can_rescale_max_parallelism(&self, desired_max_parallelism: u32) -> Option<String> {
        (self.validator)(desired_max_parallelism)
    }
}

impl PartialEq for VertexParallelismInformation {
    fn eq(&self, other: &Self) -> bool {
        self.min_parallelism == other.min_parallelism
            && self.parallelism == other.parallelism
            && self.max_parallelism == other.max_parallelism
    }
}

impl fmt::Debug for VertexParallelismInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexParallelismInformation")
            .field("min_parallelism", &self.min_parallelism)
            .field("parallelism", &self.parallelism)
            .field("max_parallelism", &self.max_parallelism)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexParallelismStore {
    vertices: BTreeMap<JobVertexId, VertexParallelismInformation>,
}

impl VertexParallelismStore {
    pub fn new() -> Self {
        VertexParallelismStore::default()
    }

    pub fn set_parallelism_info(&mut self, vertex: JobVertexId, info: VertexParallelismInformation) {
        self.vertices.insert(vertex, info);
    }

    pub fn get_parallelism_info(&self, vertex: &JobVertexId) -> Option<&VertexParallelismInformation> {
        self.vertices.get(vertex)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&JobVertexId, &VertexParallelismInformation)> {
        self.vertices.iter()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Builds the store that follows from `requirements`. Returns `None` if nothing changed.
    pub fn apply_job_resource_requirements(&self, requirements: &JobResourceRequirements) -> Option<VertexParallelismStore> {
        let mut new_store = VertexParallelismStore::new();
        let mut changed = false;

        for (vertex, old_info) in &self.vertices {
            let new_info = match requirements.get_parallelism(vertex) {
                Some(bounds) => {
                    changed |= old_info.min_parallelism != bounds.lower_bound || old_info.parallelism != bounds.upper_bound;
                    VertexParallelismInformation::new(
                        bounds.lower_bound,
                        bounds.upper_bound,
                        old_info.max_parallelism,
                        reject_any_max_parallelism_change(old_info.max_parallelism),
                    )
                }
                None => old_info.clone(),
            };
            new_store.set_parallelism_info(vertex.clone(), new_info);
        }

        changed.then_some(new_store)
    }
}

/// Default max parallelism for an operator of the given parallelism.
///
/// 1.5 times the parallelism rounded up to the next power of two, clamped to `[128, 32768]`.
pub fn compute_default_max_parallelism(parallelism: u32) -> u32 {
    let scaled = parallelism.saturating_add(parallelism / 2).max(1);
    scaled
        .checked_next_power_of_two()
        .unwrap_or(MAX_PARALLELISM_UPPER_BOUND)
        .clamp(MAX_PARALLELISM_LOWER_BOUND, MAX_PARALLELISM_UPPER_BOUND)
}

fn normalize_parallelism(parallelism: u32) -> u32 {
    parallelism.max(1)
}

fn reject_any_max_parallelism_change(max_parallelism: u32) -> MaxParallelismValidator {
    Arc::new(move |new_max| {
        (new_max != max_parallelism).then(|| format!("Cannot change the max parallelism from {} to {}.", max_parallelism, new_max))
    })
}

fn reject_lowering_in_reactive_mode(max_parallelism: u32) -> MaxParallelismValidator {
    Arc::new(move |new_max| (new_max < max_parallelism).then(|| "Cannot lower max parallelism in Reactive mode.".to_string()))
}

fn reject_below_parallelism(parallelism: u32) -> MaxParallelismValidator {
    Arc::new(move |new_max| {
        (new_max < parallelism || new_max > MAX_PARALLELISM_UPPER_BOUND).then(|| {
            format!(
                "Max parallelism {} must be between the parallelism ({}) and {}.",
                new_max, parallelism, MAX_PARALLELISM_UPPER_BOUND
            )
        })
    })
}

/// Parallelism store for reactive mode.
///
/// A vertex without a configured max parallelism gets one from `default_max_parallelism`.
/// With `adjust_parallelism` every vertex is scaled to its max parallelism, otherwise the
/// vertex parallelism is kept as configured.
pub fn compute_reactive_mode_vertex_parallelism_store<'a>(
    vertices: impl IntoIterator<Item = &'a JobVertex>,
    default_max_parallelism: impl Fn(&JobVertex) -> u32,
    adjust_parallelism: bool,
) -> VertexParallelismStore {
    let mut store = VertexParallelismStore::new();
    for vertex in vertices {
        let max_parallelism = vertex.max_parallelism.unwrap_or_else(|| default_max_parallelism(vertex));
        let parallelism = if adjust_parallelism { max_parallelism } else { normalize_parallelism(vertex.parallelism) };

        store.set_parallelism_info(
            vertex.id.clone(),
            VertexParallelismInformation::new(1, parallelism, max_parallelism, reject_lowering_in_reactive_mode(max_parallelism)),
        );
    }
    store
}

/// Parallelism store for the default execution mode. The configured parallelism is the upper bound.
pub fn compute_vertex_parallelism_store<'a>(
    vertices: impl IntoIterator<Item = &'a JobVertex>,
    default_max_parallelism: impl Fn(&JobVertex) -> u32,
) -> VertexParallelismStore {
    let mut store = VertexParallelismStore::new();
    for vertex in vertices {
        let parallelism = normalize_parallelism(vertex.parallelism);
        let max_parallelism = vertex.max_parallelism.unwrap_or_else(|| default_max_parallelism(vertex));

        store.set_parallelism_info(
            vertex.id.clone(),
            VertexParallelismInformation::new(1, parallelism, max_parallelism, reject_below_parallelism(parallelism)),
        );
    }
    store
}

/// The engine wide default used at submission time.
pub fn default_max_parallelism_of(vertex: &JobVertex) -> u32 {
    compute_default_max_parallelism(normalize_parallelism(vertex.parallelism))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_parallelism_bounds() {
        assert_eq!(compute_default_max_parallelism(1), 128);
        assert_eq!(compute_default_max_parallelism(100), 256);
        assert_eq!(compute_default_max_parallelism(30_000), MAX_PARALLELISM_UPPER_BOUND);
    }

    #[test]
    fn test_reactive_store_scales_to_max() {
        let vertex = JobVertex::new("map", 4);
        let store = compute_reactive_mode_vertex_parallelism_store([&vertex], default_max_parallelism_of, true);
        let info = store.get_parallelism_info(&vertex.id).unwrap();

        assert_eq!(info.max_parallelism(), 128);
        assert_eq!(info.parallelism(), 128);
    }

    #[test]
    fn test_reactive_store_rejects_lowering_max_parallelism() {
        let vertex = JobVertex::new("map", 4).with_max_parallelism(16);
        let store = compute_reactive_mode_vertex_parallelism_store([&vertex], default_max_parallelism_of, true);
        let info = store.get_parallelism_info(&vertex.id).unwrap();

        assert_eq!(info.can_rescale_max_parallelism(8), Some("Cannot lower max parallelism in Reactive mode.".to_string()));
        assert_eq!(info.can_rescale_max_parallelism(32), None);
    }

    #[test]
    fn test_apply_requirements_without_change_returns_none() {
        let vertex = JobVertex::new("map", 4);
        let store = compute_vertex_parallelism_store([&vertex], default_max_parallelism_of);
        let same = JobResourceRequirements::empty().with_vertex(vertex.id.clone(), 1, 4);

        assert!(store.apply_job_resource_requirements(&same).is_none());
    }

    #[test]
    fn test_apply_requirements_with_change_returns_new_store() {
        let vertex = JobVertex::new("map", 4);
        let store = compute_vertex_parallelism_store([&vertex], default_max_parallelism_of);
        let lowered = JobResourceRequirements::empty().with_vertex(vertex.id.clone(), 1, 2);

        let new_store = store.apply_job_resource_requirements(&lowered).unwrap();
        let info = new_store.get_parallelism_info(&vertex.id).unwrap();
        assert_eq!(info.parallelism(), 2);
        assert_eq!(info.max_parallelism(), 128);
    }
}

use serde::Serialize;
use std::fmt;

/// Concrete amounts of resources a slot offers or a task asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
pub struct ResourceSpec {
    pub cpu_millis: u64,
    pub task_heap_mb: u64,
    pub managed_memory_mb: u64,
    pub network_memory_mb: u64,
}

impl ResourceSpec {
    pub fn new(cpu_millis: u64, task_heap_mb: u64, managed_memory_mb: u64, network_memory_mb: u64) -> Self {
        ResourceSpec { cpu_millis, task_heap_mb, managed_memory_mb, network_memory_mb }
    }

    /// True if `self` offers at least every amount in `required`.
    pub fn covers(&self, required: &ResourceSpec) -> bool {
        self.cpu_millis >= required.cpu_millis
            && self.task_heap_mb >= required.task_heap_mb
            && self.managed_memory_mb >= required.managed_memory_mb
            && self.network_memory_mb >= required.network_memory_mb
    }
}

/// The shape of a slot request or a slot offer.
///
/// `Unknown` is used whenever the resources were not specified. A requirement of `Unknown`
/// is served by any slot, and a slot of `Unknown` profile may stand in for any requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceProfile {
    Unknown,
    Specified(ResourceSpec),
}

impl ResourceProfile {
    pub const UNKNOWN: ResourceProfile = ResourceProfile::Unknown;

    pub fn specified(cpu_millis: u64, task_heap_mb: u64, managed_memory_mb: u64, network_memory_mb: u64) -> Self {
        ResourceProfile::Specified(ResourceSpec::new(cpu_millis, task_heap_mb, managed_memory_mb, network_memory_mb))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ResourceProfile::Unknown)
    }

    /// Whether a slot with this profile can serve a request for `required`.
    pub fn is_matching(&self, required: &ResourceProfile) -> bool {
        match (self, required) {
            (_, ResourceProfile::Unknown) => true,
            (ResourceProfile::Unknown, ResourceProfile::Specified(_)) => true,
            (ResourceProfile::Specified(offered), ResourceProfile::Specified(required)) => offered.covers(required),
        }
    }
}

impl Default for ResourceProfile {
    fn default() -> Self {
        ResourceProfile::Unknown
    }
}

impl fmt::Display for ResourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceProfile::Unknown => write!(f, "ResourceProfile{{UNKNOWN}}"),
            ResourceProfile::Specified(spec) => write!(
                f,
                "ResourceProfile{{cpu={}m, taskHeap={}mb, managed={}mb, network={}mb}}",
                spec.cpu_millis, spec.task_heap_mb, spec.managed_memory_mb, spec.network_memory_mb
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_requirement_matches_everything() {
        let offered = ResourceProfile::specified(1000, 512, 0, 64);
        assert!(offered.is_matching(&ResourceProfile::UNKNOWN));
        assert!(ResourceProfile::UNKNOWN.is_matching(&ResourceProfile::UNKNOWN));
    }

    #[test]
    fn test_specified_profile_must_cover_requirement() {
        let small = ResourceProfile::specified(500, 256, 0, 32);
        let large = ResourceProfile::specified(1000, 512, 0, 64);
        assert!(large.is_matching(&small));
        assert!(!small.is_matching(&large));
    }
}

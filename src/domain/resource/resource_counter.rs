use std::collections::BTreeMap;
use std::fmt;

use crate::domain::resource::resource_profile::ResourceProfile;

/// Immutable multiset of resource profiles.
///
/// Counts are always positive; a profile whose count drops to zero disappears.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceCounter {
    resources: BTreeMap<ResourceProfile, usize>,
}

impl ResourceCounter {
    pub fn empty() -> Self {
        ResourceCounter::default()
    }

    pub fn with_resource(profile: ResourceProfile, count: usize) -> Self {
        ResourceCounter::empty().add(profile, count)
    }

    pub fn add(&self, profile: ResourceProfile, count: usize) -> Self {
        let mut resources = self.resources.clone();
        if count > 0 {
            *resources.entry(profile).or_insert(0) += count;
        }
        ResourceCounter { resources }
    }

    /// Removes up to `count` units of `profile`; removing an absent profile is a no-op.
    pub fn subtract(&self, profile: ResourceProfile, count: usize) -> Self {
        let mut resources = self.resources.clone();
        if let Some(current) = resources.get_mut(&profile) {
            if *current <= count {
                resources.remove(&profile);
            } else {
                *current -= count;
            }
        }
        ResourceCounter { resources }
    }

    pub fn contains_resource(&self, profile: &ResourceProfile) -> bool {
        self.resources.contains_key(profile)
    }

    pub fn get_resource_count(&self, profile: &ResourceProfile) -> usize {
        self.resources.get(profile).copied().unwrap_or(0)
    }

    pub fn get_total_resource_count(&self) -> usize {
        self.resources.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get_resources(&self) -> impl Iterator<Item = &ResourceProfile> {
        self.resources.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceProfile, usize)> {
        self.resources.iter().map(|(profile, count)| (profile, *count))
    }
}

impl fmt::Display for ResourceCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self.iter().map(|(profile, count)| format!("{}x{}", count, profile)).collect();
        write!(f, "ResourceCounter{{{}}}", entries.join(", "))
    }
}

/// Checks whether `free_slots` can serve every requirement in `desired` one-for-one.
///
/// Specified slots are matched first: against their exact profile, otherwise against an
/// unknown requirement. Slots of unknown profile then fill whatever is still outstanding,
/// so the answer does not depend on the order of `free_slots`.
pub fn has_desired_resources<'a>(desired: &ResourceCounter, free_slots: impl IntoIterator<Item = &'a ResourceProfile>) -> bool {
    let mut outstanding = desired.clone();
    let mut unknown_slots = 0;

    for slot_profile in free_slots {
        if slot_profile.is_unknown() {
            unknown_slots += 1;
        } else if outstanding.contains_resource(slot_profile) {
            outstanding = outstanding.subtract(*slot_profile, 1);
        } else {
            outstanding = outstanding.subtract(ResourceProfile::UNKNOWN, 1);
        }
    }

    outstanding.get_total_resource_count() <= unknown_slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_a() -> ResourceProfile {
        ResourceProfile::specified(1000, 1024, 0, 64)
    }

    fn profile_b() -> ResourceProfile {
        ResourceProfile::specified(2000, 2048, 0, 64)
    }

    #[test]
    fn test_subtract_drops_exhausted_profiles() {
        let counter = ResourceCounter::with_resource(profile_a(), 2).subtract(profile_a(), 2);
        assert!(counter.is_empty());
        assert!(!counter.contains_resource(&profile_a()));
    }

    #[test]
    fn test_subtract_absent_profile_is_noop() {
        let counter = ResourceCounter::with_resource(profile_a(), 1);
        assert_eq!(counter.subtract(profile_b(), 1), counter);
    }

    #[test]
    fn test_counter_is_immutable() {
        let counter = ResourceCounter::with_resource(profile_a(), 1);
        let _ = counter.add(profile_a(), 3);
        assert_eq!(counter.get_resource_count(&profile_a()), 1);
    }

    #[test]
    fn test_has_desired_resources_exact_match() {
        let desired = ResourceCounter::with_resource(profile_a(), 2);
        assert!(has_desired_resources(&desired, &[profile_a(), profile_a()]));
    }

    #[test]
    fn test_has_desired_resources_not_enough_slots() {
        let desired = ResourceCounter::with_resource(profile_a(), 2);
        assert!(!has_desired_resources(&desired, &[profile_a()]));
    }

    #[test]
    fn test_has_desired_resources_unknown_slot_is_wildcard() {
        let desired = ResourceCounter::with_resource(profile_a(), 2);
        assert!(has_desired_resources(&desired, &[profile_a(), ResourceProfile::UNKNOWN]));
    }

    #[test]
    fn test_unknown_requirement_served_by_any_slot() {
        let desired = ResourceCounter::with_resource(ResourceProfile::UNKNOWN, 2);
        assert!(has_desired_resources(&desired, &[profile_a(), profile_b()]));
    }

    #[test]
    fn test_mismatching_specified_slot_does_not_count() {
        let desired = ResourceCounter::with_resource(profile_a(), 1);
        assert!(!has_desired_resources(&desired, &[profile_b()]));
    }

    #[test]
    fn test_unknown_slot_order_does_not_matter() {
        let desired = ResourceCounter::with_resource(profile_a(), 1).add(profile_b(), 1);
        assert!(has_desired_resources(&desired, &[profile_a(), ResourceProfile::UNKNOWN]));
        assert!(has_desired_resources(&desired, &[ResourceProfile::UNKNOWN, profile_a()]));
        assert!(!has_desired_resources(&desired, &[profile_b(), profile_b()]));
    }

    #[test]
    fn test_specified_slots_serve_unknown_requirements_before_wildcards() {
        let desired = ResourceCounter::with_resource(ResourceProfile::UNKNOWN, 1).add(profile_b(), 1);
        assert!(has_desired_resources(&desired, &[ResourceProfile::UNKNOWN, profile_a()]));
        assert!(!has_desired_resources(&desired, &[profile_a(), profile_a()]));
    }
}

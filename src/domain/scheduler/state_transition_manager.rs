use std::time::Duration;

use crate::domain::clock::clock::add_millis;

/// What a [`DefaultStateTransitionManager`] needs from the state that owns it.
pub trait StateTransitionContext {
    fn has_desired_resources(&self) -> bool;

    fn has_sufficient_resources(&self) -> bool;

    fn transition_to_subsequent_state(&mut self);

    /// Asks for [`DefaultStateTransitionManager::evaluate`] to be called after `delay`.
    fn schedule_evaluation(&mut self, delay: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Changes are only remembered until the cooldown ends.
    Cooldown { until: i64, change_recorded: bool },
    Idling,
    Stabilizing { first_change: i64 },
    Stabilized { since: i64 },
    Transitioning,
}

/// Debounces resource changes and rescale triggers into a single transition.
///
/// Time only advances through the timestamps handed in, evaluations are idempotent and compare
/// against absolute deadlines so stale evaluations are harmless.
#[derive(Debug, Clone)]
pub struct DefaultStateTransitionManager {
    cooldown_timeout: Duration,
    stabilization_timeout: Duration,
    max_trigger_delay: Duration,
    phase: Phase,
}

impl DefaultStateTransitionManager {
    pub fn new(cooldown_timeout: Duration, stabilization_timeout: Duration, max_trigger_delay: Duration, now: i64) -> Self {
        let phase = if cooldown_timeout.is_zero() {
            Phase::Idling
        } else {
            Phase::Cooldown { until: add_millis(now, cooldown_timeout), change_recorded: false }
        };
        DefaultStateTransitionManager { cooldown_timeout, stabilization_timeout, max_trigger_delay, phase }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn start(&mut self, ctx: &mut dyn StateTransitionContext) {
        if let Phase::Cooldown { .. } = self.phase {
            ctx.schedule_evaluation(self.cooldown_timeout);
        }
    }

    /// Resources or requirements changed.
    pub fn on_change(&mut self, ctx: &mut dyn StateTransitionContext, now: i64) {
        match self.phase {
            Phase::Cooldown { until, .. } => {
                self.phase = Phase::Cooldown { until, change_recorded: true };
            }
            Phase::Idling => self.enter_stabilizing(ctx, now),
            Phase::Stabilizing { .. } | Phase::Stabilized { .. } => {
                if ctx.has_desired_resources() {
                    self.transition(ctx);
                }
            }
            Phase::Transitioning => {}
        }
    }

    /// An external rescale trigger, for example a completed checkpoint.
    pub fn on_trigger(&mut self, ctx: &mut dyn StateTransitionContext) {
        if let Phase::Stabilized { .. } = self.phase {
            if ctx.has_sufficient_resources() {
                self.transition(ctx);
            } else {
                log::debug!("Rescale trigger ignored, the resources are no longer sufficient.");
                self.phase = Phase::Idling;
            }
        }
    }

    pub fn evaluate(&mut self, ctx: &mut dyn StateTransitionContext, now: i64) {
        match self.phase {
            Phase::Cooldown { until, change_recorded } if now >= until => {
                if change_recorded {
                    self.enter_stabilizing(ctx, now);
                } else {
                    self.phase = Phase::Idling;
                }
            }
            Phase::Stabilizing { first_change } if now >= add_millis(first_change, self.stabilization_timeout) => {
                if ctx.has_desired_resources() {
                    self.transition(ctx);
                } else if ctx.has_sufficient_resources() {
                    self.enter_stabilized(ctx, now);
                } else {
                    self.phase = Phase::Idling;
                }
            }
            Phase::Stabilized { since } if now >= add_millis(since, self.max_trigger_delay) => {
                self.on_trigger(ctx);
            }
            _ => {}
        }
    }

    fn enter_stabilizing(&mut self, ctx: &mut dyn StateTransitionContext, now: i64) {
        self.phase = Phase::Stabilizing { first_change: now };
        if ctx.has_desired_resources() {
            self.transition(ctx);
        } else {
            ctx.schedule_evaluation(self.stabilization_timeout);
        }
    }

    fn enter_stabilized(&mut self, ctx: &mut dyn StateTransitionContext, now: i64) {
        self.phase = Phase::Stabilized { since: now };
        if self.max_trigger_delay.is_zero() {
            self.on_trigger(ctx);
        } else {
            ctx.schedule_evaluation(self.max_trigger_delay);
        }
    }

    fn transition(&mut self, ctx: &mut dyn StateTransitionContext) {
        self.phase = Phase::Transitioning;
        ctx.transition_to_subsequent_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeContext {
        desired: bool,
        sufficient: bool,
        transitions: usize,
        evaluations: Vec<Duration>,
    }

    impl StateTransitionContext for FakeContext {
        fn has_desired_resources(&self) -> bool {
            self.desired
        }

        fn has_sufficient_resources(&self) -> bool {
            self.sufficient
        }

        fn transition_to_subsequent_state(&mut self) {
            self.transitions += 1;
        }

        fn schedule_evaluation(&mut self, delay: Duration) {
            self.evaluations.push(delay);
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_desired_resources_transition_right_away() {
        let mut ctx = FakeContext { desired: true, sufficient: true, ..Default::default() };
        let mut manager = DefaultStateTransitionManager::new(Duration::ZERO, secs(10), Duration::ZERO, 0);

        manager.on_change(&mut ctx, 0);

        assert_eq!(ctx.transitions, 1);
        assert_eq!(manager.phase(), Phase::Transitioning);
    }

    #[test]
    fn test_changes_during_cooldown_are_deferred() {
        let mut ctx = FakeContext { desired: true, sufficient: true, ..Default::default() };
        let mut manager = DefaultStateTransitionManager::new(secs(30), secs(60), Duration::ZERO, 0);
        manager.start(&mut ctx);
        assert_eq!(ctx.evaluations, vec![secs(30)]);

        manager.on_change(&mut ctx, 1_000);
        assert_eq!(ctx.transitions, 0);

        manager.evaluate(&mut ctx, 10_000);
        assert_eq!(ctx.transitions, 0);

        manager.evaluate(&mut ctx, 30_000);
        assert_eq!(ctx.transitions, 1);
    }

    #[test]
    fn test_cooldown_without_changes_goes_idle() {
        let mut ctx = FakeContext::default();
        let mut manager = DefaultStateTransitionManager::new(secs(30), secs(60), Duration::ZERO, 0);

        manager.evaluate(&mut ctx, 30_000);

        assert_eq!(manager.phase(), Phase::Idling);
    }

    #[test]
    fn test_sufficient_resources_transition_after_stabilization() {
        let mut ctx = FakeContext { desired: false, sufficient: true, ..Default::default() };
        let mut manager = DefaultStateTransitionManager::new(Duration::ZERO, secs(10), Duration::ZERO, 0);

        manager.on_change(&mut ctx, 0);
        assert_eq!(manager.phase(), Phase::Stabilizing { first_change: 0 });
        assert_eq!(ctx.evaluations, vec![secs(10)]);

        manager.evaluate(&mut ctx, 5_000);
        assert_eq!(ctx.transitions, 0);

        manager.evaluate(&mut ctx, 10_000);
        assert_eq!(ctx.transitions, 1);
    }

    #[test]
    fn test_insufficient_resources_fall_back_to_idling() {
        let mut ctx = FakeContext::default();
        let mut manager = DefaultStateTransitionManager::new(Duration::ZERO, secs(10), Duration::ZERO, 0);

        manager.on_change(&mut ctx, 0);
        manager.evaluate(&mut ctx, 10_000);

        assert_eq!(manager.phase(), Phase::Idling);
        assert_eq!(ctx.transitions, 0);
    }

    #[test]
    fn test_stabilized_waits_for_trigger() {
        let mut ctx = FakeContext { desired: false, sufficient: true, ..Default::default() };
        let mut manager = DefaultStateTransitionManager::new(Duration::ZERO, Duration::ZERO, secs(90), 0);

        manager.on_change(&mut ctx, 0);
        manager.evaluate(&mut ctx, 0);
        assert_eq!(manager.phase(), Phase::Stabilized { since: 0 });

        manager.on_trigger(&mut ctx);
        assert_eq!(ctx.transitions, 1);
    }

    #[test]
    fn test_trigger_is_forced_after_max_delay() {
        let mut ctx = FakeContext { desired: false, sufficient: true, ..Default::default() };
        let mut manager = DefaultStateTransitionManager::new(Duration::ZERO, Duration::ZERO, secs(90), 0);

        manager.on_change(&mut ctx, 0);
        manager.evaluate(&mut ctx, 0);
        manager.evaluate(&mut ctx, 60_000);
        assert_eq!(ctx.transitions, 0);

        manager.evaluate(&mut ctx, 90_000);
        assert_eq!(ctx.transitions, 1);
    }

    #[test]
    fn test_trigger_without_sufficient_resources_goes_idle() {
        let mut ctx = FakeContext { desired: false, sufficient: true, ..Default::default() };
        let mut manager = DefaultStateTransitionManager::new(Duration::ZERO, Duration::ZERO, secs(90), 0);
        manager.on_change(&mut ctx, 0);
        manager.evaluate(&mut ctx, 0);

        ctx.sufficient = false;
        manager.on_trigger(&mut ctx);

        assert_eq!(manager.phase(), Phase::Idling);
        assert_eq!(ctx.transitions, 0);
    }
}

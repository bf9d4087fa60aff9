use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::domain::clock::clock::{SharedClock, add_millis};
use crate::domain::scheduler::adaptive_scheduler::AdaptiveScheduler;

/// Work item executed on the scheduler's main thread.
pub type MainThreadAction = Box<dyn FnOnce(&mut AdaptiveScheduler) + Send>;

struct DelayedAction {
    due_millis: i64,
    sequence: u64,
    action: MainThreadAction,
}

impl PartialEq for DelayedAction {
    fn eq(&self, other: &Self) -> bool {
        self.due_millis == other.due_millis && self.sequence == other.sequence
    }
}

impl Eq for DelayedAction {}

impl PartialOrd for DelayedAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest due action first.
impl Ord for DelayedAction {
    fn cmp(&self, other: &Self) -> Ordering {
        other.due_millis.cmp(&self.due_millis).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Default)]
struct Mailbox {
    immediate: VecDeque<MainThreadAction>,
    delayed: BinaryHeap<DelayedAction>,
    next_sequence: u64,
}

/// Mailbox of the scheduler's main thread. Clones share the mailbox and may be sent anywhere.
///
/// Immediate actions run in submission order. Delayed actions become ready once the clock reaches
/// their due time and run in due order.
#[derive(Clone)]
pub struct MainThreadExecutor {
    mailbox: Arc<(Mutex<Mailbox>, Condvar)>,
    clock: SharedClock,
}

impl MainThreadExecutor {
    pub fn new(clock: SharedClock) -> Self {
        MainThreadExecutor { mailbox: Arc::new((Mutex::new(Mailbox::default()), Condvar::new())), clock }
    }

    pub fn execute(&self, action: MainThreadAction) {
        let (lock, signal) = &*self.mailbox;
        lock.lock().expect("Mutex poisoned").immediate.push_back(action);
        signal.notify_all();
    }

    pub fn schedule(&self, action: MainThreadAction, delay: Duration) {
        let due_millis = add_millis(self.clock.current_time_millis(), delay);
        let (lock, signal) = &*self.mailbox;
        let mut mailbox = lock.lock().expect("Mutex poisoned");
        let sequence = mailbox.next_sequence;
        mailbox.next_sequence += 1;
        mailbox.delayed.push(DelayedAction { due_millis, sequence, action });
        signal.notify_all();
    }

    /// Takes the next action that may run now.
    pub fn poll_ready(&self) -> Option<MainThreadAction> {
        let now = self.clock.current_time_millis();
        let mut mailbox = self.mailbox.0.lock().expect("Mutex poisoned");
        if let Some(action) = mailbox.immediate.pop_front() {
            return Some(action);
        }
        if mailbox.delayed.peek().is_some_and(|delayed| delayed.due_millis <= now) {
            return mailbox.delayed.pop().map(|delayed| delayed.action);
        }
        None
    }

    /// Due time of the earliest delayed action.
    pub fn next_due_millis(&self) -> Option<i64> {
        self.mailbox.0.lock().expect("Mutex poisoned").delayed.peek().map(|delayed| delayed.due_millis)
    }

    pub fn number_of_pending_actions(&self) -> usize {
        let mailbox = self.mailbox.0.lock().expect("Mutex poisoned");
        mailbox.immediate.len() + mailbox.delayed.len()
    }

    pub fn has_ready_action(&self) -> bool {
        let now = self.clock.current_time_millis();
        let mailbox = self.mailbox.0.lock().expect("Mutex poisoned");
        !mailbox.immediate.is_empty() || mailbox.delayed.peek().is_some_and(|delayed| delayed.due_millis <= now)
    }

    /// Blocks until an action is ready or `timeout` of real time passed. Returns whether one is ready.
    ///
    /// With a manual clock, delayed actions only become ready when the clock is advanced.
    pub fn wait_for_ready_action(&self, timeout: Duration) -> bool {
        let (lock, signal) = &*self.mailbox;
        let deadline = std::time::Instant::now() + timeout;
        let mut mailbox = lock.lock().expect("Mutex poisoned");
        loop {
            let now = self.clock.current_time_millis();
            let ready = !mailbox.immediate.is_empty() || mailbox.delayed.peek().is_some_and(|delayed| delayed.due_millis <= now);
            if ready {
                return true;
            }

            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let next_due = mailbox
                .delayed
                .peek()
                .map(|delayed| Duration::from_millis(u64::try_from(delayed.due_millis - now).unwrap_or(0)))
                .unwrap_or(remaining);
            let (guard, _) = signal.wait_timeout(mailbox, remaining.min(next_due).max(Duration::from_millis(1))).expect("Mutex poisoned");
            mailbox = guard;
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}

impl std::fmt::Debug for MainThreadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadExecutor").field("pending_actions", &self.number_of_pending_actions()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::clock_mock::ManualClock;

    fn noop() -> MainThreadAction {
        Box::new(|_| {})
    }

    #[test]
    fn test_delayed_actions_wait_for_the_clock() {
        let clock = ManualClock::new(0);
        let executor = MainThreadExecutor::new(Arc::new(clock.clone()));
        executor.schedule(noop(), Duration::from_secs(5));

        assert!(executor.poll_ready().is_none());
        assert_eq!(executor.next_due_millis(), Some(5_000));

        clock.advance(Duration::from_secs(5));
        assert!(executor.poll_ready().is_some());
        assert_eq!(executor.number_of_pending_actions(), 0);
    }

    #[test]
    fn test_immediate_actions_run_before_due_delayed_ones() {
        let clock = ManualClock::new(0);
        let executor = MainThreadExecutor::new(Arc::new(clock));
        executor.schedule(noop(), Duration::ZERO);
        executor.execute(noop());

        assert!(executor.has_ready_action());
        executor.poll_ready();
        assert_eq!(executor.next_due_millis(), Some(0));
    }

    #[test]
    fn test_wait_times_out_without_actions() {
        let executor = MainThreadExecutor::new(Arc::new(ManualClock::new(0)));
        assert!(!executor.wait_for_ready_action(Duration::from_millis(10)));
    }
}

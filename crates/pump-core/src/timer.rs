//! Schedulable one-shot and periodic deadlines.
//!
//! Expiry is never a callback into the caller's data structures: each armed
//! timer is a small scheduler task that, when its deadline passes, sends a
//! typed event into the channel the service was built with. The task that
//! owns the mutable state (the device agent loop, the relay broker) receives
//! the event in its own `select!` loop and applies the effect there, so a
//! timer can never observe or mutate state mid-transition.
//!
//! A [`TimerHandle`] stays valid while its timer is armed. One-shot timers
//! invalidate themselves after firing; [`TimerHandle::stop`] invalidates
//! explicitly. Adjusting a handle reconfigures the existing scheduler task in
//! place — it never spawns a second one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug)]
struct TimerState {
    deadline: Instant,
    period: Option<Duration>,
    armed: bool,
}

#[derive(Debug)]
struct TimerShared {
    state: Mutex<TimerState>,
    changed: Notify,
}

/// Factory for armed timers delivering events of type `E`.
#[derive(Debug)]
pub struct TimerService<E> {
    events: mpsc::Sender<E>,
}

impl<E> Clone for TimerService<E> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> TimerService<E> {
    /// Creates a service whose timers deliver into `events`.
    pub fn new(events: mpsc::Sender<E>) -> Self {
        Self { events }
    }

    /// Arms a new timer.
    ///
    /// The first fire happens `delay` from now. With `period: Some(p)` the
    /// timer re-fires every `p` after that; with `None` it fires once and
    /// invalidates itself.
    pub fn start(&self, delay: Duration, period: Option<Duration>, event: E) -> TimerHandle<E> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                deadline: Instant::now() + delay,
                period,
                armed: true,
            }),
            changed: Notify::new(),
        });

        let task_shared = Arc::clone(&shared);
        let tx = self.events.clone();
        let task_event = event.clone();
        tokio::spawn(run_timer(task_shared, tx, task_event));

        TimerHandle { shared, event }
    }

    /// Reconfigures an armed handle in place.
    ///
    /// Calling this on a handle that is no longer running (stopped, or a
    /// one-shot that already fired) is a caller bug worth seeing in the logs;
    /// it self-heals by arming a fresh timer with the handle's event.
    pub fn adjust(&self, handle: &mut TimerHandle<E>, delay: Duration, period: Option<Duration>) {
        if !handle.is_running() {
            warn!("adjust called on a timer that is not running; starting it instead");
            *handle = self.start(delay, period, handle.event.clone());
            return;
        }
        {
            let mut st = handle.shared.state.lock().unwrap();
            st.deadline = Instant::now() + delay;
            st.period = period;
        }
        handle.shared.changed.notify_one();
    }
}

async fn run_timer<E: Clone + Send + 'static>(
    shared: Arc<TimerShared>,
    tx: mpsc::Sender<E>,
    event: E,
) {
    loop {
        let deadline = {
            let st = shared.state.lock().unwrap();
            if !st.armed {
                return;
            }
            st.deadline
        };

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                let rearmed = {
                    let mut st = shared.state.lock().unwrap();
                    if !st.armed || st.deadline > Instant::now() {
                        // Adjusted while we slept; re-evaluate.
                        continue;
                    }
                    match st.period {
                        Some(p) => {
                            st.deadline = Instant::now() + p;
                            true
                        }
                        None => {
                            st.armed = false;
                            false
                        }
                    }
                };
                if tx.send(event.clone()).await.is_err() {
                    // Owner is gone; nothing left to deliver to.
                    shared.state.lock().unwrap().armed = false;
                    return;
                }
                if !rearmed {
                    return;
                }
            }
            _ = shared.changed.notified() => {}
        }
    }
}

/// Handle to an armed timer.
#[derive(Debug)]
pub struct TimerHandle<E> {
    shared: Arc<TimerShared>,
    event: E,
}

impl<E> TimerHandle<E> {
    /// Cancels the timer and invalidates the handle.
    pub fn stop(&mut self) {
        {
            let mut st = self.shared.state.lock().unwrap();
            st.armed = false;
        }
        self.shared.changed.notify_one();
    }

    /// True while the timer is armed and will fire again.
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().unwrap().armed
    }

    /// Time until the next fire, zero when the handle is invalid.
    pub fn remaining(&self) -> Duration {
        let st = self.shared.state.lock().unwrap();
        if !st.armed {
            return Duration::ZERO;
        }
        st.deadline.saturating_duration_since(Instant::now())
    }

    /// Time until the next fire truncated to whole minutes, zero when the
    /// handle is invalid.
    pub fn remaining_minutes(&self) -> u16 {
        (self.remaining().as_secs() / 60).min(u64::from(u16::MAX)) as u16
    }
}

impl<E> Drop for TimerHandle<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Tick {
        Cutoff,
        Heartbeat,
    }

    fn service() -> (TimerService<Tick>, mpsc::Receiver<Tick>) {
        let (tx, rx) = mpsc::channel(16);
        (TimerService::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once_then_invalidates() {
        let (svc, mut rx) = service();
        let handle = svc.start(Duration::from_secs(600), None, Tick::Cutoff);
        assert!(handle.is_running());

        let fired = timeout(Duration::from_secs(601), rx.recv()).await;
        assert_eq!(fired.unwrap(), Some(Tick::Cutoff));

        // No second delivery, and the handle is dead.
        let again = timeout(Duration::from_secs(3600), rx.recv()).await;
        assert!(again.is_err(), "one-shot must not fire twice");
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_timer_re_fires() {
        let (svc, mut rx) = service();
        let _handle = svc.start(
            Duration::from_secs(10),
            Some(Duration::from_secs(10)),
            Tick::Heartbeat,
        );

        for _ in 0..3 {
            let fired = timeout(Duration::from_secs(11), rx.recv()).await;
            assert_eq!(fired.unwrap(), Some(Tick::Heartbeat));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_delivery() {
        let (svc, mut rx) = service();
        let mut handle = svc.start(Duration::from_secs(60), None, Tick::Cutoff);
        handle.stop();
        assert!(!handle.is_running());

        let fired = timeout(Duration::from_secs(120), rx.recv()).await;
        assert!(fired.is_err(), "stopped timer must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjust_moves_the_deadline_without_a_new_handle() {
        let (svc, mut rx) = service();
        let mut handle = svc.start(Duration::from_secs(600), None, Tick::Cutoff);

        svc.adjust(&mut handle, Duration::from_secs(1200), None);

        // Nothing at the old deadline…
        let early = timeout(Duration::from_secs(700), rx.recv()).await;
        assert!(early.is_err(), "adjusted timer fired at the old deadline");

        // …one delivery at the new one.
        let fired = timeout(Duration::from_secs(600), rx.recv()).await;
        assert_eq!(fired.unwrap(), Some(Tick::Cutoff));
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjust_on_dead_handle_self_heals() {
        let (svc, mut rx) = service();
        let mut handle = svc.start(Duration::from_secs(5), None, Tick::Cutoff);
        handle.stop();

        svc.adjust(&mut handle, Duration::from_secs(30), None);
        assert!(handle.is_running(), "self-heal must arm a fresh timer");

        let fired = timeout(Duration::from_secs(31), rx.recv()).await;
        assert_eq!(fired.unwrap(), Some(Tick::Cutoff));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_minutes_truncates() {
        let (svc, _rx) = service();
        let handle = svc.start(Duration::from_secs(10 * 60 + 59), None, Tick::Cutoff);
        assert_eq!(handle.remaining_minutes(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_minutes_is_zero_for_stopped_handle() {
        let (svc, _rx) = service();
        let mut handle = svc.start(Duration::from_secs(600), None, Tick::Cutoff);
        handle.stop();
        assert_eq!(handle.remaining_minutes(), 0);
        assert_eq!(handle.remaining(), Duration::ZERO);
    }
}

//! Single-shot (or self-re-arming) timeout timer with cancel semantics.
//!
//! One worker thread serves the timer for its whole life. Arming while a wait
//! is in flight first cancels it and synchronises on the worker being back in
//! its waiting state, then arms the new wait.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::log::log_sink::LogSink;
use crate::{sink_debug, sink_info};

const CANCEL_SYNC_TIMEOUT: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Waiting,
    Working,
    Cancelled,
    Exited,
}

struct Control {
    state: TimerState,
    armed: bool,
    reuse: bool,
    timeout: Duration,
    task_name: String,
}

struct Shared {
    control: Mutex<Control>,
    /// Arms a new wait.
    task_cond: Condvar,
    /// Cancels the wait in flight.
    cancel_cond: Condvar,
    /// Signals the worker is back in `Waiting`.
    wait_cond: Condvar,
    callback: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

pub struct TimeoutTimer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl TimeoutTimer {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                state: TimerState::Waiting,
                armed: false,
                reuse: false,
                timeout: Duration::from_secs(0),
                task_name: String::new(),
            }),
            task_cond: Condvar::new(),
            cancel_cond: Condvar::new(),
            wait_cond: Condvar::new(),
            callback: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("timeout-timer".into())
            .spawn(move || main_loop(&worker_shared, logger))
            .ok();

        Self { shared, thread }
    }

    pub fn set_timeout_callback(&self, callback: Box<dyn Fn() + Send + Sync>) {
        if let Ok(mut slot) = self.shared.callback.lock() {
            *slot = Some(callback);
        }
    }

    /// Arm the timer. An in-flight wait is cancelled first.
    pub fn start_timer(&self, timeout: Duration, info: &str) {
        self.start_timer_impl(timeout, info, false);
    }

    /// Arm a timer that re-arms itself after every expiry.
    pub fn start_reusable_timer(&self, timeout: Duration, info: &str) {
        self.start_timer_impl(timeout, info, true);
    }

    fn start_timer_impl(&self, timeout: Duration, info: &str, reuse: bool) {
        let Ok(mut control) = self.shared.control.lock() else {
            return;
        };
        if control.state == TimerState::Working {
            control.state = TimerState::Cancelled;
            self.shared.cancel_cond.notify_all();
            let (guard, _) = match self
                .shared
                .wait_cond
                .wait_timeout(control, CANCEL_SYNC_TIMEOUT)
            {
                Ok(result) => result,
                Err(_) => return,
            };
            control = guard;
        }
        control.timeout = timeout;
        control.task_name = info.to_string();
        control.reuse = reuse;
        control.armed = true;
        drop(control);
        self.shared.task_cond.notify_all();
    }

    /// Cancel the wait in flight, if any.
    pub fn stop_timer(&self) {
        let Ok(mut control) = self.shared.control.lock() else {
            return;
        };
        control.armed = false;
        control.reuse = false;
        if control.state == TimerState::Working {
            control.state = TimerState::Cancelled;
            self.shared.cancel_cond.notify_all();
            let _ = self
                .shared
                .wait_cond
                .wait_timeout(control, CANCEL_SYNC_TIMEOUT);
        }
    }
}

fn main_loop(shared: &Arc<Shared>, logger: Arc<dyn LogSink>) {
    loop {
        let (timeout, task_name) = {
            let Ok(mut control) = shared.control.lock() else {
                return;
            };
            loop {
                if control.state == TimerState::Exited {
                    return;
                }
                control.state = TimerState::Waiting;
                shared.wait_cond.notify_all();
                if control.armed {
                    break;
                }
                control = match shared.task_cond.wait(control) {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
            }
            control.armed = control.reuse;
            control.state = TimerState::Working;
            (control.timeout, control.task_name.clone())
        };

        sink_debug!(logger, "[TimeoutTimer] start ({task_name})");
        let deadline = Instant::now() + timeout;
        let fire = {
            let Ok(mut control) = shared.control.lock() else {
                return;
            };
            loop {
                if control.state != TimerState::Working {
                    break false;
                }
                let now = Instant::now();
                if now >= deadline {
                    break true;
                }
                control = match shared.cancel_cond.wait_timeout(control, deadline - now) {
                    Ok((guard, _)) => guard,
                    Err(_) => return,
                };
            }
        };

        if fire {
            sink_info!(logger, "[TimeoutTimer] fire ({task_name})");
            if let Ok(slot) = shared.callback.lock() {
                if let Some(callback) = slot.as_ref() {
                    callback();
                }
            }
        }
    }
}

impl Drop for TimeoutTimer {
    fn drop(&mut self) {
        if let Ok(mut control) = self.shared.control.lock() {
            control.state = TimerState::Exited;
        }
        self.shared.task_cond.notify_all();
        self.shared.cancel_cond.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::log::NoopLogSink;
    use std::sync::mpsc;

    fn timer_with_probe() -> (TimeoutTimer, mpsc::Receiver<Instant>) {
        let timer = TimeoutTimer::new(Arc::new(NoopLogSink));
        let (tx, rx) = mpsc::channel();
        timer.set_timeout_callback(Box::new(move || {
            let _ = tx.send(Instant::now());
        }));
        (timer, rx)
    }

    #[test]
    fn expires_once_after_the_timeout() {
        let (timer, rx) = timer_with_probe();
        timer.start_timer(Duration::from_millis(30), "unit");
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        // Single shot: no second firing.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn stop_prevents_the_callback() {
        let (timer, rx) = timer_with_probe();
        timer.start_timer(Duration::from_millis(100), "unit");
        timer.stop_timer();
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn rearming_supersedes_the_previous_wait() {
        let (timer, rx) = timer_with_probe();
        timer.start_timer(Duration::from_millis(40), "first");
        timer.start_timer(Duration::from_millis(120), "second");

        let started = Instant::now();
        let fired = rx.recv_timeout(Duration::from_secs(2)).expect("fired");
        // Must come from the re-armed wait, not the first one.
        assert!(fired.duration_since(started) >= Duration::from_millis(100));
    }

    #[test]
    fn reusable_timer_fires_repeatedly() {
        let (timer, rx) = timer_with_probe();
        timer.start_reusable_timer(Duration::from_millis(20), "tick");
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        timer.stop_timer();
    }

    #[test]
    fn drop_joins_regardless_of_state() {
        let (timer, _rx) = timer_with_probe();
        timer.start_timer(Duration::from_secs(30), "long");
        drop(timer); // must not hang
    }
}

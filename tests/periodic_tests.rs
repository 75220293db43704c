//! Periodic task driver tests

#[cfg(test)]
mod common {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use kobj::port::sim::{SimKernel, SimTask};

    pub fn sim() -> (&'static SimKernel, &'static SimTask) {
        let kernel: &'static SimKernel = Box::leak(Box::new(SimKernel::new()));
        let task: &'static SimTask = Box::leak(Box::new(SimTask::new(kernel)));
        (kernel, task)
    }

    pub fn counter() -> (Arc<AtomicU32>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn hits(count: &AtomicU32) -> u32 {
        count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod sim_tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, OnceLock};

    use super::common::*;
    use kobj::error::OsError;
    use kobj::port::sim::{SimKernel, SimTask};
    use kobj::port::TaskPort;
    use kobj::timer::TimerPool;
    use kobj::types::*;
    use kobj::{PeriodicTask, Pool, Timer, WaitMode};

    #[test]
    fn test_runs_until_terminated() {
        let (kernel, task) = sim();
        let (starts, on_start) = counter();
        let (stops, on_stop) = counter();
        let runs = Arc::new(AtomicU32::new(0));

        let routine_runs = Arc::clone(&runs);
        let driver = PeriodicTask::new(task, 10, on_start, on_stop, move || {
            if routine_runs.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                task.terminate();
            }
        })
        .with_wait_mode(WaitMode::Sleep);

        assert_eq!(driver.run(), Ok(()));

        assert_eq!(hits(&starts), 1);
        assert_eq!(hits(&runs), 5);
        assert_eq!(hits(&stops), 1);
        assert_eq!(task.waits(), 5);
        assert_eq!(kernel.now(), 50);
        assert!(!driver.is_executing());
    }

    #[test]
    fn test_zero_period_does_not_wait() {
        let (kernel, task) = sim();
        let runs = Arc::new(AtomicU32::new(0));

        let routine_runs = Arc::clone(&runs);
        let driver = PeriodicTask::new(task, 0, || {}, || {}, move || {
            if routine_runs.fetch_add(1, Ordering::SeqCst) + 1 == 100 {
                task.terminate();
            }
        });

        driver.run().unwrap();
        assert_eq!(hits(&runs), 100);
        assert_eq!(task.waits(), 0);
        assert_eq!(kernel.now(), 0);
    }

    #[test]
    fn test_not_running_skips_loop() {
        let (_kernel, task) = sim();
        let (starts, on_start) = counter();
        let (stops, on_stop) = counter();
        let (runs, routine) = counter();

        task.terminate();
        let driver = PeriodicTask::new(task, 10, on_start, on_stop, routine);
        driver.run().unwrap();

        assert_eq!(hits(&starts), 1);
        assert_eq!(hits(&runs), 0);
        assert_eq!(hits(&stops), 1);
    }

    #[test]
    fn test_terminate_cuts_wait_short() {
        let (kernel, task) = sim();
        let pool: &'static TimerPool<SimKernel, 2> = Box::leak(Box::new(Pool::new()));
        let (runs, routine) = counter();
        let (stops, on_stop) = counter();

        // Shutdown request arrives a quarter into the period
        let mut shutdown = Timer::new(kernel, pool, "shutdown", 25, TimerMode::OneShot, move || {
            task.terminate();
            task.abort_delay();
        });
        shutdown.start(OS_NO_WAIT).unwrap();

        let driver = PeriodicTask::new(task, 100, || {}, on_stop, routine);
        driver.run().unwrap();

        assert_eq!(kernel.now(), 25);
        assert_eq!(hits(&runs), 0, "routine must not run after termination");
        assert_eq!(hits(&stops), 1);
    }

    #[test]
    fn test_abort_before_wait_is_kept() {
        let (kernel, task) = sim();
        let (runs, mut routine) = counter();

        // Abort lands after the loop check, before the task waits
        let driver = PeriodicTask::new(
            task,
            100,
            move || {
                task.abort_delay();
            },
            || {},
            move || {
                routine();
                task.terminate();
            },
        );
        driver.run().unwrap();
        assert_eq!(hits(&runs), 1);
        assert_eq!(kernel.now(), 0, "first wait must end immediately");

        // Same for a bare delay
        assert!(task.abort_delay());
        task.delay(100);
        assert_eq!(kernel.now(), 0);
        task.delay(5);
        assert_eq!(kernel.now(), 5);
    }

    #[test]
    fn test_notification_drives_iterations() {
        let (kernel, task) = sim();
        let pool: &'static TimerPool<SimKernel, 2> = Box::leak(Box::new(Pool::new()));
        let runs = Arc::new(AtomicU32::new(0));

        let mut stimulus = Timer::new(kernel, pool, "stimulus", 10, TimerMode::AutoReload, move || {
            task.notify(1);
        });
        stimulus.start(OS_NO_WAIT).unwrap();

        let routine_runs = Arc::clone(&runs);
        let driver = PeriodicTask::new(task, 1000, || {}, || {}, move || {
            if routine_runs.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                task.terminate();
            }
        });
        assert_eq!(driver.wait_mode(), WaitMode::Notify);
        driver.run().unwrap();

        // Three notifications instead of three full periods
        assert_eq!(hits(&runs), 3);
        assert_eq!(kernel.now(), 30);
    }

    #[test]
    fn test_sleep_ignores_notification() {
        let (kernel, task) = sim();
        let runs = Arc::new(AtomicU32::new(0));

        task.notify(7);
        let routine_runs = Arc::clone(&runs);
        let driver = PeriodicTask::new(task, 20, || {}, || {}, move || {
            routine_runs.fetch_add(1, Ordering::SeqCst);
            task.terminate();
        })
        .with_wait_mode(WaitMode::Sleep);

        driver.run().unwrap();
        assert_eq!(hits(&runs), 1);
        assert_eq!(kernel.now(), 20);
    }

    #[test]
    fn test_reentry_rejected() {
        type Driver = PeriodicTask<&'static SimTask>;
        static DRIVER: OnceLock<&'static Driver> = OnceLock::new();
        static NESTED: OnceLock<Result<(), OsError>> = OnceLock::new();

        let (_kernel, task) = sim();
        let driver: &'static Driver = Box::leak(Box::new(PeriodicTask::new(
            task,
            5,
            || {},
            || {},
            move || {
                if let Some(driver) = DRIVER.get() {
                    let _ = NESTED.set(driver.run());
                }
                task.terminate();
            },
        )));
        let _ = DRIVER.set(driver);

        assert_eq!(driver.run(), Ok(()));
        assert_eq!(NESTED.get(), Some(&Err(OsError::TaskRunning)));

        // Body can run again once the first run finished
        assert!(!driver.is_executing());
    }

    #[test]
    fn test_accessors() {
        let (_kernel, task) = sim();
        let driver = PeriodicTask::new(task, 42, || {}, || {}, || {});

        assert_eq!(driver.period(), 42);
        assert!(driver.is_running());
        assert!(driver.notify(3));

        driver.terminate();
        assert!(!driver.is_running());
        assert!(!driver.task().is_running());
    }
}

#[cfg(test)]
mod thread_tests {
    use std::sync::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    use portable_atomic::{AtomicBool, Ordering};

    use super::common::*;
    use kobj::port::TaskPort;
    use kobj::types::*;
    use kobj::{PeriodicTask, WaitMode};

    #[derive(Default)]
    struct Signal {
        notified: Option<OsNotifyValue>,
        abort: bool,
    }

    /// Task collaborator backed by a host thread, one tick per millisecond
    struct StdTask {
        running: AtomicBool,
        signal: Mutex<Signal>,
        wake: Condvar,
    }

    impl StdTask {
        fn new() -> Self {
            StdTask {
                running: AtomicBool::new(true),
                signal: Mutex::new(Signal::default()),
                wake: Condvar::new(),
            }
        }

        fn wait(&self, ticks: OsTick, wake_on_notify: bool) -> Option<OsNotifyValue> {
            let timeout = Duration::from_millis(ticks as u64);
            let guard = self.signal.lock().unwrap();
            let (mut guard, _) = self
                .wake
                .wait_timeout_while(guard, timeout, |s| {
                    !s.abort && !(wake_on_notify && s.notified.is_some())
                })
                .unwrap();
            guard.abort = false;
            if wake_on_notify {
                guard.notified.take()
            } else {
                None
            }
        }
    }

    impl TaskPort for StdTask {
        fn is_running(&self) -> bool {
            self.running.load(Ordering::Acquire)
        }

        fn delay(&self, ticks: OsTick) {
            self.wait(ticks, false);
        }

        fn notify_wait(&self, ticks: OsTick) -> Option<OsNotifyValue> {
            self.wait(ticks, true)
        }

        fn notify(&self, value: OsNotifyValue) -> bool {
            self.signal.lock().unwrap().notified = Some(value);
            self.wake.notify_all();
            true
        }

        fn abort_delay(&self) -> bool {
            self.signal.lock().unwrap().abort = true;
            self.wake.notify_all();
            true
        }

        fn terminate(&self) {
            self.running.store(false, Ordering::Release);
        }
    }

    #[test]
    fn test_timely_shutdown() {
        for mode in [WaitMode::Notify, WaitMode::Sleep] {
            let (started, on_start) = counter();
            let (stops, on_stop) = counter();
            let (runs, routine) = counter();

            // Ten second period
            let driver = PeriodicTask::new(StdTask::new(), 10_000, on_start, on_stop, routine)
                .with_wait_mode(mode);

            let begin = Instant::now();
            std::thread::scope(|scope| {
                let worker = scope.spawn(|| driver.run());

                while hits(&started) == 0 {
                    std::thread::yield_now();
                }
                std::thread::sleep(Duration::from_millis(20));
                driver.terminate();

                assert_eq!(worker.join().unwrap(), Ok(()));
            });

            assert!(begin.elapsed() < Duration::from_secs(5), "terminate must abort the wait");
            assert_eq!(hits(&runs), 0);
            assert_eq!(hits(&stops), 1);
        }
    }

    #[test]
    fn test_notify_from_other_thread() {
        let (runs, routine) = counter();
        let driver = PeriodicTask::new(StdTask::new(), 10_000, || {}, || {}, routine);

        std::thread::scope(|scope| {
            let worker = scope.spawn(|| driver.run());

            for _ in 0..3 {
                let before = hits(&runs);
                driver.notify(1);
                let deadline = Instant::now() + Duration::from_secs(5);
                while hits(&runs) == before && Instant::now() < deadline {
                    std::thread::yield_now();
                }
            }
            assert_eq!(hits(&runs), 3);

            driver.terminate();
            worker.join().unwrap().unwrap();
        });
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::debug;

/// A unit of work a `Service` runs on its own worker thread: the original
/// message that triggered it plus the routine to execute. The routine is
/// handed a [`JobControl`] alongside its payload; a long-running routine
/// must poll `JobControl::is_cancelled` between iterations to honor
/// cancellation, since it runs on the worker thread with no other way to
/// be interrupted mid-flight.
pub struct JobItem {
    pub msg: String,
    pub routine: Box<dyn FnOnce(&str, &JobControl) + Send>,
}

impl JobItem {
    pub fn new(msg: impl Into<String>, routine: impl FnOnce(&str, &JobControl) + Send + 'static) -> Self {
        Self { msg: msg.into(), routine: Box::new(routine) }
    }
}

/// Handed to a running job so it can check whether
/// [`ServiceWorker::cancel_current_job`] has been called since it started.
#[derive(Clone)]
pub struct JobControl {
    cancel: Arc<AtomicBool>,
}

impl JobControl {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

struct Shared {
    active: AtomicBool,
    job_running: AtomicBool,
    job_cancel: Arc<AtomicBool>,
    next_job: Mutex<Option<JobItem>>,
    cond: Condvar,
}

/// The worker-thread half of a `Service`: one pending-job slot, overwritten
/// (not queued) on every `submit`, drained by a single background thread.
///
/// This is a direct translation of `Service::DoWork()`: the loop waits on
/// `cond` while `active && next_job.is_none()`, breaks if `!active`, takes
/// ownership of whatever is in the slot, drops the lock, then runs the job
/// with `job_running` set for its duration.
pub struct ServiceWorker {
    name: &'static str,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl ServiceWorker {
    pub fn start(name: &'static str) -> Self {
        let shared = Arc::new(Shared {
            active: AtomicBool::new(true),
            job_running: AtomicBool::new(false),
            job_cancel: Arc::new(AtomicBool::new(false)),
            next_job: Mutex::new(None),
            cond: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let thread_name = name;
        let thread = std::thread::Builder::new()
            .name(format!("{thread_name}-worker"))
            .spawn(move || Self::do_work(&worker_shared, thread_name))
            .expect("failed to spawn service worker thread");

        Self { name, shared, thread: Some(thread) }
    }

    fn do_work(shared: &Shared, name: &str) {
        duplex_utils::thread_boot(None, duplex_utils::ThreadPriority::OSDefault);
        loop {
            let mut guard = shared.next_job.lock().unwrap();
            while shared.active.load(Ordering::SeqCst) && guard.is_none() {
                guard = shared.cond.wait(guard).unwrap();
            }
            if !shared.active.load(Ordering::SeqCst) {
                break;
            }
            let job = guard.take().expect("woke with no job and still active");
            drop(guard);

            shared.job_cancel.store(false, Ordering::SeqCst);
            let control = JobControl { cancel: Arc::clone(&shared.job_cancel) };
            shared.job_running.store(true, Ordering::SeqCst);
            debug!(service = name, job = %job.msg, "running job");
            (job.routine)(&job.msg, &control);
            shared.job_running.store(false, Ordering::SeqCst);
        }
        debug!(service = name, "worker thread exiting");
    }

    /// Overwrites the pending-job slot and wakes the worker. If a job is
    /// already sitting unclaimed in the slot it is silently dropped, same
    /// as `pNextJob.reset(...)` in the original.
    pub fn submit(&self, job: JobItem) {
        let mut guard = self.shared.next_job.lock().unwrap();
        *guard = Some(job);
        drop(guard);
        self.shared.cond.notify_one();
    }

    pub fn is_job_running(&self) -> bool {
        self.shared.job_running.load(Ordering::SeqCst)
    }

    /// Signals the currently running job to stop at its next cancellation
    /// check, without blocking the caller or joining the worker thread.
    /// Does not touch `active`: the worker stays alive to accept the next
    /// `submit`. A no-op if no job is running.
    pub fn cancel_current_job(&self) {
        self.shared.job_cancel.store(true, Ordering::SeqCst);
    }

    /// Stops the worker thread and joins it. Safe to call more than once.
    pub fn terminate(&mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
        self.shared.cond.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServiceWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            debug!(service = self.name, "dropping without explicit terminate(), stopping worker");
            self.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn runs_submitted_jobs_on_the_worker_thread() {
        let worker = ServiceWorker::start("test");
        let (tx, rx) = mpsc::channel();

        worker.submit(JobItem::new("hello", move |msg, _control| {
            tx.send(msg.to_string()).unwrap();
        }));

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "hello");
    }

    #[test]
    fn a_second_submit_before_the_first_runs_overwrites_the_slot() {
        // Hold the slot lock open by submitting from inside a job that
        // blocks until we've overwritten the pending slot, then verify
        // only the last submitted job actually ran.
        let worker = ServiceWorker::start("test-overwrite");
        let (ran_tx, ran_rx) = mpsc::channel();
        let gate = Arc::new((Mutex::new(false), Condvar::new()));

        let gate_clone = gate.clone();
        worker.submit(JobItem::new("first", move |_, _control| {
            let (lock, cond) = &*gate_clone;
            let mut opened = lock.lock().unwrap();
            while !*opened {
                opened = cond.wait(opened).unwrap();
            }
        }));

        // Let the first job start running (it's now blocked on the gate,
        // so the slot is free) before the second overwrite races it.
        std::thread::sleep(Duration::from_millis(20));

        let ran_tx2 = ran_tx.clone();
        worker.submit(JobItem::new("second", move |msg, _control| {
            ran_tx2.send(msg.to_string()).unwrap();
        }));

        {
            let (lock, cond) = &*gate;
            *lock.lock().unwrap() = true;
            cond.notify_all();
        }

        assert_eq!(ran_rx.recv_timeout(Duration::from_secs(1)).unwrap(), "second");
    }

    #[test]
    fn terminate_stops_the_worker_thread() {
        let mut worker = ServiceWorker::start("test-terminate");
        worker.terminate();
        assert!(worker.thread.is_none());
    }

    #[test]
    fn cancel_current_job_lets_a_long_running_routine_exit_early_without_terminating_the_worker() {
        let mut worker = ServiceWorker::start("test-cancel");
        let (tx, rx) = mpsc::channel();

        worker.submit(JobItem::new("count", move |_, control| {
            let mut iterations = 0;
            loop {
                if control.is_cancelled() {
                    break;
                }
                iterations += 1;
                std::thread::sleep(Duration::from_millis(5));
            }
            tx.send(iterations).unwrap();
        }));

        std::thread::sleep(Duration::from_millis(20));
        worker.cancel_current_job();
        let iterations = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(iterations > 0);

        // The worker thread itself is still alive and able to run another job.
        let (tx2, rx2) = mpsc::channel();
        worker.submit(JobItem::new("after-cancel", move |msg, _control| {
            tx2.send(msg.to_string()).unwrap();
        }));
        assert_eq!(rx2.recv_timeout(Duration::from_secs(1)).unwrap(), "after-cancel");

        worker.terminate();
    }
}

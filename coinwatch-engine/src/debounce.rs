//! Cancellable coalescing timer.
//!
//! Debounces rapid user actions (search input, watchlist toggles): scheduling a new task
//! supersedes the one still waiting out its window, so only the most recent task within
//! the window runs. Supersession ends once a task's body starts - a task caught mid
//! execution runs to completion, so a flush is never torn down between its side effects.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// Default coalescing window for debounced user actions.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    // Bumped on every schedule/cancel; a waiting task runs only if it still owns the
    // latest generation when its window elapses.
    generation: Arc<AtomicU64>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedule `task` to run after the window elapses, superseding any task still
    /// waiting out its window.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<Fut>(&self, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let generation = Arc::clone(&self.generation);
        let scheduled = generation.fetch_add(1, Ordering::AcqRel) + 1;

        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // Superseded while waiting: a newer schedule (or a cancel) owns the window.
            if generation.load(Ordering::Acquire) != scheduled {
                return;
            }
            task.await;
        });
    }

    /// Discard the task still waiting out its window, if any.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const WINDOW: Duration = Duration::from_millis(200);

    #[tokio::test(start_paused = true)]
    async fn test_only_most_recent_task_runs() {
        let debouncer = Debouncer::new(WINDOW);
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));

        for value in 1..=5 {
            let runs = Arc::clone(&runs);
            let last = Arc::clone(&last);
            debouncer.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                last.store(value, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_outside_the_window_both_run() {
        let debouncer = Debouncer::new(WINDOW);
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let runs = Arc::clone(&runs);
            debouncer.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(WINDOW * 2).await;
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_task() {
        let debouncer = Debouncer::new(WINDOW);
        let runs = Arc::new(AtomicUsize::new(0));

        {
            let runs = Arc::clone(&runs);
            debouncer.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        debouncer.cancel();

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_task_runs_to_completion_despite_new_schedule() {
        let debouncer = Debouncer::new(WINDOW);
        let finished = Arc::new(AtomicUsize::new(0));

        {
            let finished = Arc::clone(&finished);
            debouncer.schedule(async move {
                // Await point mid-body, like a flush suspended on store I/O.
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Let the first task start its body, then schedule another mid-execution.
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        {
            let finished = Arc::clone(&finished);
            debouncer.schedule(async move {
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }
}

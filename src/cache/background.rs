//! Detached work started by a resolution but never awaited by its caller.

use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// Set of fire-and-forget tasks (background refreshes, deferred writes).
///
/// Tasks own their error handling; nothing they produce reaches the task
/// that spawned them. `settle` lets a host drain them before shutting down.
#[derive(Clone, Default)]
pub struct Background {
  tasks: Arc<Mutex<JoinSet<()>>>,
}

impl Background {
  pub fn spawn<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    match self.tasks.lock() {
      Ok(mut tasks) => {
        // Reap finished tasks so a long-running host does not accumulate them
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
      }
      Err(e) => {
        tracing::warn!("background task set poisoned, running detached: {}", e);
        tokio::spawn(task);
      }
    }
  }

  /// Wait for every task spawned so far, including tasks they spawn in turn.
  ///
  /// Dropping the returned future early leaves the remaining tasks running.
  pub async fn settle(&self) {
    loop {
      let mut pending = match self.tasks.lock() {
        Ok(mut tasks) => Draining(std::mem::take(&mut *tasks)),
        Err(_) => return,
      };
      if pending.0.is_empty() {
        return;
      }

      while let Some(result) = pending.0.join_next().await {
        if let Err(e) = result {
          if e.is_panic() {
            tracing::warn!("background task panicked: {}", e);
          }
        }
      }
    }
  }
}

/// Tasks taken out of the set by `settle`; detached rather than aborted if
/// the wait is cut short.
struct Draining(JoinSet<()>);

impl Drop for Draining {
  fn drop(&mut self) {
    self.0.detach_all();
  }
}

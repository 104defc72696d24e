//! Deduplication of concurrent work by key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Runs at most one computation per key; concurrent and later callers for
/// the same key share its result.
pub struct SingleFlight<T> {
  cells: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for SingleFlight<T> {
  fn default() -> Self {
    Self {
      cells: Mutex::new(HashMap::new()),
    }
  }
}

impl<T: Clone> SingleFlight<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Result of `work` for `key`, computing it only if no caller has yet.
  pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
  {
    let cell = {
      let mut cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
      Arc::clone(cells.entry(key.to_string()).or_default())
    };
    cell.get_or_init(work).await.clone()
  }
}

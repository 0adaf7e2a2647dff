use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

struct TimerEntry {
    id: u64,
    handle: JoinHandle<()>,
}

struct TimersInner {
    next_id: u64,
    entries: HashMap<String, TimerEntry>,
}

/// Single-shot timers keyed by name.
///
/// Arming a key that is already armed replaces the pending timer. Each timer
/// carries a generation id so that a task which was already past its sleep
/// when it got replaced or cancelled can detect that and not fire.
pub struct Timers {
    inner: Arc<Mutex<TimersInner>>,
}

impl Timers {
    pub fn new() -> Timers {
        Timers {
            inner: Arc::new(Mutex::new(TimersInner {
                next_id: 0,
                entries: HashMap::new(),
            })),
        }
    }

    pub fn set_timeout<F>(&self, key: &str, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.inner.lock().expect("timers lock");
        let id = inner.next_id;
        inner.next_id += 1;

        if let Some(old) = inner.entries.remove(key) {
            old.handle.abort();
        }

        let inner_ref = Arc::clone(&self.inner);
        let task_key = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let fire = {
                let mut inner = inner_ref.lock().expect("timers lock");
                match inner.entries.get(&task_key) {
                    Some(entry) if entry.id == id => {
                        inner.entries.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };
            if fire {
                callback();
            }
        });

        inner.entries.insert(key.to_string(), TimerEntry { id, handle });
    }

    pub fn clear_timeout(&self, key: &str) {
        let mut inner = self.inner.lock().expect("timers lock");
        if let Some(entry) = inner.entries.remove(key) {
            entry.handle.abort();
        }
    }

    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().expect("timers lock");
        for (_, entry) in inner.entries.drain() {
            entry.handle.abort();
        }
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.inner
            .lock()
            .expect("timers lock")
            .entries
            .contains_key(key)
    }
}

impl Default for Timers {
    fn default() -> Timers {
        Timers::new()
    }
}

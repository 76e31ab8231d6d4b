use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Default)]
struct RotatorState {
    cursor: usize,
    failed: HashSet<usize>,
    exhausted_at: Option<Instant>,
}

/// Round-robin over a pool of API keys that skips keys marked as failed.
///
/// The pool never locks up: once every key has failed the failed set is
/// cleared after `cooldown`, and `next_key` falls back to the first key if
/// it is asked before then.
#[derive(Debug)]
pub struct ApiKeyRotator {
    keys: Vec<String>,
    cooldown: Duration,
    state: Mutex<RotatorState>,
}

impl ApiKeyRotator {
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Self {
        let mut unique = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.trim().to_string();
            if !key.is_empty() && !unique.contains(&key) {
                unique.push(key);
            }
        }

        Self {
            keys: unique,
            cooldown,
            state: Mutex::new(RotatorState::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.lock().failed.len()
    }

    pub fn next_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }

        let mut state = self.lock();
        let count = self.keys.len();

        for offset in 0..count {
            let index = (state.cursor + offset) % count;
            if !state.failed.contains(&index) {
                state.cursor = (index + 1) % count;
                return Some(self.keys[index].clone());
            }
        }

        warn!(keys = count, "every API key is marked failed, resetting pool");
        state.failed.clear();
        state.exhausted_at = None;
        state.cursor = 1 % count;
        Some(self.keys[0].clone())
    }

    pub fn mark_failed(&self, key: &str) {
        let Some(index) = self.keys.iter().position(|k| k == key) else {
            return;
        };

        let mut state = self.lock();
        if state.failed.insert(index) {
            warn!(
                key_index = index,
                failed = state.failed.len(),
                total = self.keys.len(),
                "API key marked failed"
            );
        }
        if state.failed.len() == self.keys.len() && state.exhausted_at.is_none() {
            state.exhausted_at = Some(Instant::now());
        }
    }

    /// Takes the lock and clears an exhausted pool whose cooldown has passed.
    fn lock(&self) -> MutexGuard<'_, RotatorState> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(since) = state.exhausted_at {
            if since.elapsed() >= self.cooldown {
                info!(cooldown = ?self.cooldown, "API key cooldown elapsed, pool restored");
                state.failed.clear();
                state.exhausted_at = None;
            }
        }
        state
    }
}

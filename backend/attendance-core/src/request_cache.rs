// src/request_cache.rs
//
// Time-boxed cache with in-flight request coalescing. One instance per remote
// operation; `get_or_fetch` is the only way in.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::debug;

use crate::error::SheetError;

type Shared<T> = Arc<OnceCell<Result<T, SheetError>>>;

// Cache entry with the moment it was stored
#[derive(Debug, Clone)]
struct CachedData<T> {
    stored_at: Instant,
    data: T,
}

impl<T> CachedData<T> {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

struct CacheState<T> {
    entries: HashMap<String, CachedData<T>>,
    in_flight: HashMap<String, Shared<T>>,
}

pub struct RequestCache<T> {
    name: &'static str,
    /// `None` coalesces concurrent calls but never stores results
    ttl: Option<Duration>,
    // Both maps behind one lock so a finished request moves from in-flight
    // to cached without a gap
    state: Mutex<CacheState<T>>,
}

impl<T: Clone> RequestCache<T> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self::build(name, Some(ttl))
    }

    /// Coalesces concurrent identical calls, never caches.
    pub fn uncached(name: &'static str) -> Self {
        Self::build(name, None)
    }

    fn build(name: &'static str, ttl: Option<Duration>) -> Self {
        Self {
            name,
            ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            }),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Cached value if fresh, else join the in-flight request for `key`, else
    /// run `fetch`. Only successes are cached; failures reach every caller
    /// that joined the request.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<T, SheetError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SheetError>>,
    {
        let shared = {
            let mut state = self.state.lock().await;

            if let Some(ttl) = self.ttl {
                match state.entries.get(key) {
                    Some(cached) if cached.is_fresh(ttl) => {
                        debug!("[{}] cache hit for key: {}", self.name, key);
                        return Ok(cached.data.clone());
                    }
                    Some(_) => {
                        debug!("[{}] cache stale for key: {}", self.name, key);
                        state.entries.remove(key);
                    }
                    None => {}
                }
            }

            match state.in_flight.get(key) {
                Some(pending) => {
                    debug!("[{}] joining in-flight request for key: {}", self.name, key);
                    pending.clone()
                }
                None => {
                    debug!("[{}] cache miss, issuing request for key: {}", self.name, key);
                    let pending: Shared<T> = Arc::new(OnceCell::new());
                    state.in_flight.insert(key.to_string(), pending.clone());
                    pending
                }
            }
        }; // Lock released while the request runs

        let result = shared.get_or_init(fetch).await.clone();

        let mut state = self.state.lock().await;
        let owns_entry = state
            .in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &shared));
        if owns_entry {
            state.in_flight.remove(key);
            if let (Some(_), Ok(data)) = (self.ttl, &result) {
                state.entries.insert(
                    key.to_string(),
                    CachedData {
                        stored_at: Instant::now(),
                        data: data.clone(),
                    },
                );
            }
        }

        result
    }

    pub async fn cached_len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

/// Composite key: operation, base URL, then each parameter trimmed and
/// lower-cased.
pub fn cache_key(operation: &str, base_url: &str, params: &[&str]) -> String {
    compose_key(
        operation,
        base_url,
        params.iter().map(|param| param.trim().to_lowercase()),
    )
}

/// Same layout as `cache_key` but parameters are kept byte-for-byte.
/// Credentials go through here so that only identical inputs coalesce.
pub fn exact_key(operation: &str, base_url: &str, params: &[&str]) -> String {
    compose_key(operation, base_url, params.iter().map(|param| param.to_string()))
}

fn compose_key<I>(operation: &str, base_url: &str, params: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut key = format!("{}|{}", operation, escape_part(base_url.trim()));
    for param in params {
        key.push('|');
        key.push_str(&escape_part(&param));
    }
    key
}

// `|` separates parts, so it is escaped inside values
fn escape_part(part: &str) -> String {
    part.replace('\\', "\\\\").replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_normalizes_parameters() {
        assert_eq!(
            cache_key("query", "https://x/exec", &["  TP01 ", "3月班表", ""]),
            "query|https://x/exec|tp01|3月班表|"
        );
        assert_eq!(
            cache_key("sheets", "https://x/exec", &["tp01"]),
            cache_key("sheets", "https://x/exec", &[" TP01"])
        );
    }

    #[test]
    fn cache_key_escapes_separator_inside_parameters() {
        let left = cache_key("query", "https://x/exec", &["a|b", "c"]);
        let right = cache_key("query", "https://x/exec", &["a", "b|c"]);
        assert_ne!(left, right);
        assert_eq!(left, "query|https://x/exec|a\\|b|c");
        assert_ne!(
            cache_key("query", "u", &["a\\", "b"]),
            cache_key("query", "u", &["a\\|b"])
        );
    }

    #[test]
    fn exact_key_keeps_case_and_padding() {
        assert_ne!(
            exact_key("verifyLogin", "https://x/exec", &["王小明", "0101"]),
            exact_key("verifyLogin", "https://x/exec", &["王小明", " 0101 "])
        );
        assert_ne!(
            exact_key("verifyLogin", "https://x/exec", &["王小明", "abc"]),
            exact_key("verifyLogin", "https://x/exec", &["王小明", "ABC"])
        );
    }
}

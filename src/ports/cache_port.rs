//! Response cache port.

use std::time::Duration;

pub trait CachePort {
    /// Cached JSON for `key`, or `None` when absent or expired.
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String, ttl: Duration);
    fn invalidate_prefix(&self, prefix: &str);
}

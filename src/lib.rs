//! Compound Cache - an in-process cache keyed by compound keys
//!
//! Values live in a trie addressed by tuples of scalar key parts, for
//! example `("tenant", 42, "profile")`. Every branch tracks the total size
//! and count of the values below it, so whole namespaces can be measured,
//! viewed through a [`PartialView`], or dropped at once. When a byte
//! capacity is set, writes that push the cache over it evict the least
//! recently used entries (or whole subtrees at a chosen depth).
//!
//! ```
//! use compound_cache::{key, CompoundCache};
//!
//! let mut cache = CompoundCache::builder().capacity("1MB").build().unwrap();
//! cache.insert(&key!["acme", "users", 1], "Ada".to_string()).unwrap();
//! cache.insert(&key!["acme", "users", 2], "Grace".to_string()).unwrap();
//!
//! assert_eq!(cache.count(), 2);
//! assert_eq!(cache.size_of(&key!["acme"]), Some(12));
//!
//! let users = cache.partial(&key!["acme", "users"]).unwrap();
//! assert_eq!(users.peek(&key![2]), Some(&"Grace".to_string()));
//! ```

pub mod cache;
pub mod capacity;
pub mod clock;
pub mod config;
pub mod error;
pub mod size;

pub use cache::{CacheStats, CompoundCache, Evicted, Key, KeyPart, PartialView};
pub use capacity::{parse_capacity, Capacity};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{CacheBuilder, CacheConfig};
pub use error::{CacheError, Result};
pub use size::{JsonSize, SizeEstimator};

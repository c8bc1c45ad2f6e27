//! Cache Module
//!
//! The compound-key trie: nodes, the engine, iteration, pruning and
//! partial views.

mod iter;
mod key;
mod node;
mod partial;
mod prune;
mod stats;
mod store;


// Re-export public types
pub use iter::{Entries, Keys, Nodes, Values};
pub use key::{display_key, Key, KeyPart};
pub use node::Leaf;
pub use partial::PartialView;
pub use prune::{Evicted, PrunePolicy, PrunedCallback};
pub use stats::CacheStats;
pub use store::CompoundCache;

//! Immutable on-disk index structures: key→record tries and string blobs.

pub mod blob;
pub mod trie;

pub use blob::{BlobBuilder, StringBlob};
pub use trie::{Trie, TrieBuilder};

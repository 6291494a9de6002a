//! Heuristic, reflection-free size estimation for cached values.
//!
//! Every cached value describes itself through [`CacheValue::shape`]; the estimator only ever
//! matches on [`ValueShape`], so recognizing a new kind of value is a local change to one impl.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Default recursion bound for nested containers.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Cost of a value the estimator knows nothing about.
pub const OPAQUE_SIZE: usize = 8;
/// Cost of a boolean flag.
pub const FLAG_SIZE: usize = 8;

/// How a cached value is laid out, as far as size estimation is concerned.
pub enum ValueShape<'a> {
    /// A string; costed by its UTF-16 length.
    Text(&'a str),
    /// A byte buffer of the given length.
    Bytes(usize),
    /// A record with a fixed, precomputed cost.
    Fixed(usize),
    Flag,
    /// A list or map; children are costed recursively up to the depth bound.
    Container(Vec<&'a dyn CacheValue>),
    Opaque,
}

/// A value that can live in the cache registry.
pub trait CacheValue: Any + Send + Sync + fmt::Debug {
    fn shape(&self) -> ValueShape<'_>;
}

/// Estimated in-memory cost of a string: `24 + ceil(len / 8) * 16` with `len` in UTF-16 units.
pub fn string_size(text: &str) -> usize {
    let len = text.encode_utf16().count();
    24 + len.div_ceil(8) * 16
}

/// Estimated in-memory cost of a byte buffer: `8 + ceil(len / 16) * 16`.
pub fn byte_array_size(len: usize) -> usize {
    8 + len.div_ceil(16) * 16
}

pub fn estimate_size(value: &dyn CacheValue) -> usize {
    estimate_at_depth(value, 0, DEFAULT_MAX_DEPTH)
}

/// Sum of the estimated sizes of `children`, descending into nested containers at most
/// `max_depth` levels. Containers below the bound contribute nothing.
pub fn estimate_container_size(children: &[&dyn CacheValue], max_depth: usize) -> usize {
    children
        .iter()
        .map(|child| estimate_at_depth(*child, 1, max_depth))
        .fold(0usize, usize::saturating_add)
}

/// Like [`estimate_size`], but a panicking [`CacheValue`] impl counts as zero instead of
/// unwinding into the caller.
pub fn estimate_size_lossy(value: &dyn CacheValue) -> usize {
    match panic::catch_unwind(AssertUnwindSafe(|| estimate_size(value))) {
        Ok(size) => size,
        Err(_) => {
            tracing::debug!(
                target: "ocms.memory",
                "size estimation failed; counting value as zero"
            );
            0
        }
    }
}

fn estimate_at_depth(value: &dyn CacheValue, depth: usize, max_depth: usize) -> usize {
    match value.shape() {
        ValueShape::Text(text) => string_size(text),
        ValueShape::Bytes(len) => byte_array_size(len),
        ValueShape::Fixed(size) => size,
        ValueShape::Flag => FLAG_SIZE,
        ValueShape::Opaque => OPAQUE_SIZE,
        ValueShape::Container(children) => {
            if depth >= max_depth {
                return 0;
            }
            children
                .into_iter()
                .map(|child| estimate_at_depth(child, depth + 1, max_depth))
                .fold(0usize, usize::saturating_add)
        }
    }
}

impl CacheValue for String {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Text(self)
    }
}

impl CacheValue for bool {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Flag
    }
}

/// Raw file content (e.g. cached XML entities).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteContent(pub Vec<u8>);

impl CacheValue for ByteContent {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Bytes(self.0.len())
    }
}

impl<T: CacheValue> CacheValue for Vec<T> {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Container(self.iter().map(|item| item as &dyn CacheValue).collect())
    }
}

impl<T: CacheValue> CacheValue for HashMap<String, T> {
    fn shape(&self) -> ValueShape<'_> {
        let mut children: Vec<&dyn CacheValue> = Vec::with_capacity(self.len() * 2);
        for (key, value) in self {
            children.push(key);
            children.push(value);
        }
        ValueShape::Container(children)
    }
}

impl<T: CacheValue> CacheValue for BTreeMap<String, T> {
    fn shape(&self) -> ValueShape<'_> {
        let mut children: Vec<&dyn CacheValue> = Vec::with_capacity(self.len() * 2);
        for (key, value) in self {
            children.push(key);
            children.push(value);
        }
        ValueShape::Container(children)
    }
}

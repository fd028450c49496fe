//! Snapshot and keyed access for state payloads.
//!
//! A unit keeps a frozen copy of its initial value and hands out fresh
//! copies of it on reset. [`Snapshot`] describes how that copy is taken.
//! It is a shallow clone: the top-level container is rebuilt, while
//! anything held behind an `Arc` stays shared with the original.
//!
//! [`Keyed`] gives `State::get` and `State::default` a way to project a
//! single field out of a payload.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

/// A value that can produce a structurally independent copy of itself.
///
/// Implementations must never return something that aliases `self`'s
/// top-level storage. Mutating the copy must leave the original untouched,
/// except through shared handles (`Arc`) the payload deliberately holds.
///
/// Plain records implement this with a field-wise copy, usually
/// `self.clone()`:
///
/// ```rust
/// use galena_core::Snapshot;
///
/// #[derive(Clone)]
/// struct Todo {
///     title: String,
///     done: bool,
/// }
///
/// impl Snapshot for Todo {
///     fn snapshot(&self) -> Self {
///         self.clone()
///     }
/// }
/// ```
pub trait Snapshot: Sized {
    /// Take a shallow copy of this value.
    fn snapshot(&self) -> Self;
}

macro_rules! snapshot_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Snapshot for $ty {
                fn snapshot(&self) -> Self {
                    self.clone()
                }
            }
        )*
    };
}

snapshot_by_value!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String,
);

impl<V: ?Sized> Snapshot for Arc<V> {
    fn snapshot(&self) -> Self {
        Arc::clone(self)
    }
}

impl<V: Clone> Snapshot for Option<V> {
    fn snapshot(&self) -> Self {
        self.clone()
    }
}

// Sequences: element-wise.

impl<V: Clone> Snapshot for Vec<V> {
    fn snapshot(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl<V: Clone> Snapshot for VecDeque<V> {
    fn snapshot(&self) -> Self {
        self.iter().cloned().collect()
    }
}

// Sets and maps: entry-wise.

impl<V: Clone + Eq + Hash, S: BuildHasher + Clone> Snapshot for HashSet<V, S> {
    fn snapshot(&self) -> Self {
        let mut copy = HashSet::with_capacity_and_hasher(self.len(), self.hasher().clone());
        copy.extend(self.iter().cloned());
        copy
    }
}

impl<V: Clone + Ord> Snapshot for BTreeSet<V> {
    fn snapshot(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl<V: Clone + Eq + Hash, S: BuildHasher + Clone> Snapshot for IndexSet<V, S> {
    fn snapshot(&self) -> Self {
        let mut copy = IndexSet::with_capacity_and_hasher(self.len(), self.hasher().clone());
        copy.extend(self.iter().cloned());
        copy
    }
}

impl<K: Clone + Eq + Hash, V: Clone, S: BuildHasher + Clone> Snapshot for HashMap<K, V, S> {
    fn snapshot(&self) -> Self {
        let mut copy = HashMap::with_capacity_and_hasher(self.len(), self.hasher().clone());
        copy.extend(self.iter().map(|(k, v)| (k.clone(), v.clone())));
        copy
    }
}

impl<K: Clone + Ord, V: Clone> Snapshot for BTreeMap<K, V> {
    fn snapshot(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K: Clone + Eq + Hash, V: Clone, S: BuildHasher + Clone> Snapshot for IndexMap<K, V, S> {
    fn snapshot(&self) -> Self {
        let mut copy = IndexMap::with_capacity_and_hasher(self.len(), self.hasher().clone());
        copy.extend(self.iter().map(|(k, v)| (k.clone(), v.clone())));
        copy
    }
}

/// A payload whose fields can be read by key.
pub trait Keyed {
    /// The key type used to address a field.
    type Key: ?Sized;
    /// The type of a single field.
    type Field: ?Sized;

    /// Look up a field, `None` if absent.
    fn field(&self, key: &Self::Key) -> Option<&Self::Field>;
}

impl<V> Keyed for Vec<V> {
    type Key = usize;
    type Field = V;

    fn field(&self, key: &usize) -> Option<&V> {
        self.get(*key)
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> Keyed for HashMap<K, V, S> {
    type Key = K;
    type Field = V;

    fn field(&self, key: &K) -> Option<&V> {
        self.get(key)
    }
}

impl<K: Ord, V> Keyed for BTreeMap<K, V> {
    type Key = K;
    type Field = V;

    fn field(&self, key: &K) -> Option<&V> {
        self.get(key)
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> Keyed for IndexMap<K, V, S> {
    type Key = K;
    type Field = V;

    fn field(&self, key: &K) -> Option<&V> {
        self.get(key)
    }
}

//! Three-way set comparison
//!
//! Used by harness-based tests to diff the values every worker reported
//! against the values actually found in the structure under test.

use std::collections::HashSet;
use std::hash::Hash;

/// Result of comparing set A against set B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetComparison<T: Eq + Hash> {
    /// A - B
    pub only_in_a: HashSet<T>,
    /// B - A
    pub only_in_b: HashSet<T>,
    /// A ∩ B
    pub in_both: HashSet<T>,
}

impl<T: Eq + Hash> SetComparison<T> {
    /// True when neither side has elements the other lacks
    pub fn is_identical(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }
}

/// Compare two optional collections as sets. `None` is treated as empty.
///
/// Duplicates within either input collapse; equality is the element type's
/// `Eq`/`Hash`.
pub fn compare<T, A, B>(a: Option<A>, b: Option<B>) -> SetComparison<T>
where
    T: Eq + Hash,
    A: IntoIterator<Item = T>,
    B: IntoIterator<Item = T>,
{
    let set_a: HashSet<T> = a.map(|it| it.into_iter().collect()).unwrap_or_default();
    let mut only_in_b: HashSet<T> = b.map(|it| it.into_iter().collect()).unwrap_or_default();

    let mut only_in_a = HashSet::new();
    let mut in_both = HashSet::new();
    for item in set_a {
        if only_in_b.remove(&item) {
            in_both.insert(item);
        } else {
            only_in_a.insert(item);
        }
    }

    SetComparison {
        only_in_a,
        only_in_b,
        in_both,
    }
}

//! Value-equality set operations over `Vec<T>`.
//!
//! Every permission list (role members, role routes, schema templates, ACM
//! object sets) is stored as a list with set semantics. Membership is decided
//! by `PartialEq` on the element type, never by identity, and removal always
//! compacts the list.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Set mutation requested by an administrator (`push` = grant, `pull` = revoke).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetOp {
    Push,
    Pull,
}

impl SetOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetOp::Push => "push",
            SetOp::Pull => "pull",
        }
    }
}

impl core::fmt::Display for SetOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SetOp {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(SetOp::Push),
            "pull" => Ok(SetOp::Pull),
            other => Err(DomainError::validation(format!(
                "operation must be push or pull, got '{other}'"
            ))),
        }
    }
}

/// Append every item not already present. Returns how many were added.
///
/// Duplicates inside `items` are collapsed as well.
pub fn push_unique<T: PartialEq + Clone>(target: &mut Vec<T>, items: &[T]) -> usize {
    let before = target.len();
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
    target.len() - before
}

/// Remove every element equal to one of `items`. Returns how many were removed.
pub fn pull_all<T: PartialEq>(target: &mut Vec<T>, items: &[T]) -> usize {
    let before = target.len();
    target.retain(|existing| !items.contains(existing));
    before - target.len()
}

/// Apply `op` with `items` to `target`. Returns how many elements changed.
pub fn apply<T: PartialEq + Clone>(op: SetOp, target: &mut Vec<T>, items: &[T]) -> usize {
    match op {
        SetOp::Push => push_unique(target, items),
        SetOp::Pull => pull_all(target, items),
    }
}

/// Deduplicate a list in place, keeping first occurrences in order.
pub fn dedup<T: PartialEq + Clone>(items: &mut Vec<T>) {
    let mut out = Vec::with_capacity(items.len());
    push_unique(&mut out, items);
    *items = out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn push_skips_existing_and_repeated_items() {
        let mut v = vec!["a".to_string()];
        let added = push_unique(&mut v, &["a".to_string(), "b".to_string(), "b".to_string()]);
        assert_eq!(added, 1);
        assert_eq!(v, vec!["a", "b"]);
    }

    #[test]
    fn pull_compacts_without_holes() {
        let mut v = vec![1, 2, 3, 2, 4];
        let removed = pull_all(&mut v, &[2, 9]);
        assert_eq!(removed, 2);
        assert_eq!(v, vec![1, 3, 4]);
    }

    #[test]
    fn pull_of_absent_item_is_noop() {
        let mut v = vec![1, 2];
        assert_eq!(pull_all(&mut v, &[7]), 0);
        assert_eq!(v, vec![1, 2]);
    }

    #[test]
    fn structured_elements_compare_by_value() {
        let mut v = vec![serde_json::json!({"route": "/a", "method": "GET"})];
        let added = push_unique(&mut v, &[serde_json::json!({"method": "GET", "route": "/a"})]);
        assert_eq!(added, 0);
    }

    #[test]
    fn set_op_parses_only_known_operations() {
        assert_eq!("push".parse::<SetOp>().unwrap(), SetOp::Push);
        assert_eq!("pull".parse::<SetOp>().unwrap(), SetOp::Pull);
        assert!("PUSH".parse::<SetOp>().is_err());
    }

    proptest! {
        #[test]
        fn push_is_idempotent(
            base in proptest::collection::vec(0u8..20, 0..20),
            items in proptest::collection::vec(0u8..20, 0..10),
        ) {
            let mut once = base.clone();
            dedup(&mut once);
            push_unique(&mut once, &items);

            let mut twice = once.clone();
            prop_assert_eq!(push_unique(&mut twice, &items), 0);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn pull_after_any_number_of_pushes_removes(
            base in proptest::collection::vec(0u8..20, 0..20),
            item in 0u8..20,
            repeats in 1usize..5,
        ) {
            let mut v = base;
            for _ in 0..repeats {
                push_unique(&mut v, &[item]);
            }
            pull_all(&mut v, &[item]);
            prop_assert!(!v.contains(&item));
        }
    }
}

//! Category tree traversal.

use std::collections::{HashSet, VecDeque};

use crate::models::Category;
use crate::types::CategoryId;

/// Active descendants of `root`, breadth first.
///
/// Children are visited in name order. Inactive categories are skipped
/// together with everything below them. When `include_self` is set, `root`
/// is appended last. A parent cycle in the data cannot make this loop.
///
/// `categories` must contain every category that could be below `root`;
/// the storefront passes the full table, which is small.
#[must_use]
pub fn descendants(categories: &[Category], root: CategoryId, include_self: bool) -> Vec<CategoryId> {
    let mut seen = HashSet::from([root]);
    let mut queue: VecDeque<CategoryId> = active_children(categories, root).collect();
    let mut out = Vec::new();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        out.push(id);
        queue.extend(active_children(categories, id));
    }

    if include_self {
        out.push(root);
    }
    out
}

fn active_children(categories: &[Category], parent: CategoryId) -> impl Iterator<Item = CategoryId> {
    let mut children: Vec<&Category> = categories
        .iter()
        .filter(|c| c.is_active && c.parent_id == Some(parent))
        .collect();
    children.sort_by(|a, b| a.name.cmp(&b.name));
    children.into_iter().map(|c| c.id)
}

/// Top-level active categories in name order.
#[must_use]
pub fn roots(categories: &[Category]) -> Vec<&Category> {
    let mut roots: Vec<&Category> = categories
        .iter()
        .filter(|c| c.is_active && c.parent_id.is_none())
        .collect();
    roots.sort_by(|a, b| a.name.cmp(&b.name));
    roots
}

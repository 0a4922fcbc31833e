//! Cycle-safe depth-first walk over a lazily discovered category graph
//!
//! Runs on an explicit stack instead of recursion so arbitrarily deep trees
//! are fine. Children are pushed in reverse so the visit order is the same
//! pre-order a recursive walk would produce.

use std::collections::HashSet;
use std::fmt;

/// A category reached during traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    /// 1-based visit order within this traversal
    pub ordinal: usize,
    /// Name as returned by the source
    pub name: String,
    /// Slash-joined ancestor chain, root first
    pub path: String,
    pub depth: usize,
}

/// Returned by the visit callback to keep going or stop early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitFlow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Distinct canonical nodes visited
    pub visited: usize,
    /// Arrivals at an already visited node (cycles, diamonds)
    pub revisits: usize,
    /// Child listings that failed and were treated as empty
    pub child_fetch_failures: usize,
    /// The visit callback asked to stop before the graph was exhausted
    pub stopped: bool,
}

impl TraversalStats {
    pub fn is_complete(&self) -> bool {
        !self.stopped
    }
}

/// Per-node visit failure; aborts the traversal
#[derive(Debug)]
pub enum TraversalError<E> {
    Visit { node: CategoryNode, error: E },
}

impl<E: fmt::Display> fmt::Display for TraversalError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visit { node, error } => {
                write!(f, "visit of {} (#{}) failed: {error}", node.path, node.ordinal)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for TraversalError<E> {}

struct Pending {
    name: String,
    path: String,
    depth: usize,
}

/// Walk the graph rooted at `root`.
///
/// Each canonical name is visited at most once, under the path by which it
/// was first reached. A failing `fetch_children` is logged and counted as a
/// leaf; a failing `visit` aborts with [`TraversalError::Visit`].
pub fn traverse<C, F, FE, V, E>(
    root: &str,
    canonicalize: C,
    mut fetch_children: F,
    mut visit: V,
) -> Result<TraversalStats, TraversalError<E>>
where
    C: Fn(&str) -> String,
    F: FnMut(&CategoryNode) -> Result<Vec<String>, FE>,
    FE: fmt::Display,
    V: FnMut(&CategoryNode) -> Result<VisitFlow, E>,
{
    let mut visited: HashSet<String> = HashSet::new();
    let mut stats = TraversalStats::default();
    let mut stack = vec![Pending {
        name: root.to_string(),
        path: root.to_string(),
        depth: 0,
    }];

    while let Some(pending) = stack.pop() {
        let canonical = canonicalize(&pending.name);
        if !visited.insert(canonical) {
            log::debug!("Already visited: {}", pending.path);
            stats.revisits += 1;
            continue;
        }

        let node = CategoryNode {
            ordinal: visited.len(),
            name: pending.name,
            path: pending.path,
            depth: pending.depth,
        };
        stats.visited += 1;

        match visit(&node) {
            Ok(VisitFlow::Continue) => {}
            Ok(VisitFlow::Stop) => {
                stats.stopped = true;
                break;
            }
            Err(error) => return Err(TraversalError::Visit { node, error }),
        }

        match fetch_children(&node) {
            Ok(children) => {
                for child in children.into_iter().rev() {
                    stack.push(Pending {
                        path: format!("{}/{child}", node.path),
                        name: child,
                        depth: node.depth + 1,
                    });
                }
            }
            Err(e) => {
                log::warn!("Listing children of {} failed, treating as leaf: {e}", node.path);
                stats.child_fetch_failures += 1;
            }
        }
    }

    Ok(stats)
}

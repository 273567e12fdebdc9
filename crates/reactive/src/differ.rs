//! Patches between result snapshots.
//!
//! Sequences are aligned by a longest common subsequence over element keys;
//! records are keyed by id, everything else by value. Replaying the ops of a
//! sequence diff in order on the old sequence yields the new one, and every
//! maximal run of removed or added elements is a single op.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::mem;
use strata_incremental::Node;

/// One edit of a sequence. Indexes refer to the sequence as it is when the
/// op is applied.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SeqOp<T> {
    Remove { index: usize, count: usize },
    Add { index: usize, items: Vec<T> },
}

/// A change between two nodes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Patch {
    /// Replace the node wholesale.
    Replace(Node),
    /// Patch fields of a record with the same id and shape.
    Record(BTreeMap<String, Patch>),
    /// Edit a list, then patch the matched records at their new indexes.
    List {
        ops: Vec<SeqOp<Node>>,
        changed: Vec<(usize, Patch)>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Keep(usize, usize),
    Remove(usize),
    Add(usize),
}

/// Aligns two key sequences, trimming the common prefix and suffix before
/// running the quadratic table.
fn align<K: PartialEq>(a: &[K], b: &[K]) -> Vec<Step> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (n, m) = (a.len() - prefix - suffix, b.len() - prefix - suffix);
    let (am, bm) = (&a[prefix..prefix + n], &b[prefix..prefix + m]);

    // lcs[i * w + j] = LCS length of am[i..] and bm[j..]
    let w = m + 1;
    let mut lcs = vec![0u32; (n + 1) * w];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * w + j] = if am[i] == bm[j] {
                lcs[(i + 1) * w + j + 1] + 1
            } else {
                lcs[(i + 1) * w + j].max(lcs[i * w + j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(a.len().max(b.len()));
    steps.extend((0..prefix).map(|k| Step::Keep(k, k)));
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && am[i] == bm[j] {
            steps.push(Step::Keep(prefix + i, prefix + j));
            i += 1;
            j += 1;
        } else if j == m || (i < n && lcs[(i + 1) * w + j] >= lcs[i * w + j + 1]) {
            steps.push(Step::Remove(prefix + i));
            i += 1;
        } else {
            steps.push(Step::Add(prefix + j));
            j += 1;
        }
    }
    steps.extend((0..suffix).map(|k| Step::Keep(prefix + n + k, prefix + m + k)));
    steps
}

fn flush<T>(ops: &mut Vec<SeqOp<T>>, pos: &mut usize, removed: &mut usize, added: &mut Vec<T>) {
    if *removed > 0 {
        ops.push(SeqOp::Remove {
            index: *pos,
            count: mem::take(removed),
        });
    }
    if !added.is_empty() {
        let items = mem::take(added);
        *pos += items.len();
        ops.push(SeqOp::Add {
            index: *pos - items.len(),
            items,
        });
    }
}

/// Turns an alignment into ops: one removal and one insertion at most per
/// gap between kept elements.
fn ops_from_steps<T: Clone>(steps: &[Step], new: &[T]) -> Vec<SeqOp<T>> {
    let mut ops = Vec::new();
    let mut pos = 0;
    let mut removed = 0;
    let mut added = Vec::new();

    for step in steps {
        match *step {
            Step::Keep(..) => {
                flush(&mut ops, &mut pos, &mut removed, &mut added);
                pos += 1;
            }
            Step::Remove(_) => removed += 1,
            Step::Add(j) => added.push(new[j].clone()),
        }
    }
    flush(&mut ops, &mut pos, &mut removed, &mut added);
    ops
}

/// Diffs two sequences by element key.
pub fn diff_sequence<'a, T, K, F>(old: &'a [T], new: &'a [T], key: F) -> Vec<SeqOp<T>>
where
    T: Clone,
    K: PartialEq,
    F: Fn(&'a T) -> K,
{
    let a: Vec<K> = old.iter().map(&key).collect();
    let b: Vec<K> = new.iter().map(&key).collect();
    ops_from_steps(&align(&a, &b), new)
}

/// Replays sequence ops in order. Out-of-range indexes are clamped.
pub fn apply_ops<T: Clone>(seq: &mut Vec<T>, ops: &[SeqOp<T>]) {
    for op in ops {
        match op {
            SeqOp::Remove { index, count } => {
                let start = (*index).min(seq.len());
                let end = (start + count).min(seq.len());
                seq.drain(start..end);
            }
            SeqOp::Add { index, items } => {
                let at = (*index).min(seq.len());
                seq.splice(at..at, items.iter().cloned());
            }
        }
    }
}

#[derive(PartialEq)]
enum NodeKey<'a> {
    Id(&'a str),
    Node(&'a Node),
}

fn node_key(node: &Node) -> NodeKey<'_> {
    match node {
        Node::Record { id, .. } => NodeKey::Id(id),
        other => NodeKey::Node(other),
    }
}

/// Diffs two result nodes. Returns `None` when they are equal.
pub fn diff_node(old: &Node, new: &Node) -> Option<Patch> {
    if old == new {
        return None;
    }
    match (old, new) {
        (
            Node::Record { id: old_id, fields: old_fields },
            Node::Record { id: new_id, fields: new_fields },
        ) if old_id == new_id && old_fields.keys().eq(new_fields.keys()) => {
            let fields: BTreeMap<_, _> = old_fields
                .iter()
                .zip(new_fields.values())
                .filter_map(|((name, a), b)| diff_node(a, b).map(|patch| (name.clone(), patch)))
                .collect();
            Some(Patch::Record(fields))
        }
        (Node::List(a), Node::List(b)) => {
            let ka: Vec<_> = a.iter().map(node_key).collect();
            let kb: Vec<_> = b.iter().map(node_key).collect();
            let steps = align(&ka, &kb);
            let changed = steps
                .iter()
                .filter_map(|step| match *step {
                    Step::Keep(i, j) => diff_node(&a[i], &b[j]).map(|patch| (j, patch)),
                    _ => None,
                })
                .collect();
            Some(Patch::List {
                ops: ops_from_steps(&steps, b),
                changed,
            })
        }
        _ => Some(Patch::Replace(new.clone())),
    }
}

/// Applies a patch produced by `diff_node`.
pub fn apply_patch(node: &mut Node, patch: &Patch) {
    match (node, patch) {
        (node, Patch::Replace(replacement)) => *node = replacement.clone(),
        (Node::Record { fields, .. }, Patch::Record(patches)) => {
            for (name, patch) in patches {
                if let Some(field) = fields.get_mut(name) {
                    apply_patch(field, patch);
                }
            }
        }
        (Node::List(items), Patch::List { ops, changed }) => {
            apply_ops(items, ops);
            for (index, patch) in changed {
                if let Some(item) = items.get_mut(*index) {
                    apply_patch(item, patch);
                }
            }
        }
        (node, patch) => {
            tracing::warn!(?patch, node = ?node, "patch does not fit node shape");
        }
    }
}

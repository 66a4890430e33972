#![forbid(unsafe_code)]


use crate::model::{ChangeEvent, ChangeKind, Chunk};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EditOp {
    Equal,
    Delete,
    Insert,
}

// Aligns two ordered chunk sequences and reports grouped change events.
// Pure function of its inputs; identical sequences yield no events.
pub fn diff_chunks(old: &[Chunk], new: &[Chunk]) -> Vec<ChangeEvent> {
    let script = edit_script(old, new);
    group_script(&script, old, new)
}

// Classic LCS alignment: O(n*m) table over chunk content equality.
// The backtrack emits one op per chunk position, oldest-first.
fn edit_script(old: &[Chunk], new: &[Chunk]) -> Vec<EditOp> {
    let n = old.len();
    let m = new.len();

    let mut table = vec![0usize; (n + 1) * (m + 1)];
    let at = |i: usize, j: usize| i * (m + 1) + j;

    for i in 1..=n {
        for j in 1..=m {
            table[at(i, j)] = if old[i - 1].content == new[j - 1].content {
                table[at(i - 1, j - 1)] + 1
            } else {
                table[at(i - 1, j)].max(table[at(i, j - 1)])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let mut i = n;
    let mut j = m;
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1].content == new[j - 1].content {
            ops.push(EditOp::Equal);
            i -= 1;
            j -= 1;
        } else if i > 0 && (j == 0 || table[at(i - 1, j)] >= table[at(i, j - 1)]) {
            // Tie-break: when a deletion and an insertion extend the optimal
            // alignment equally, mark the deletion. Deterministic default.
            ops.push(EditOp::Delete);
            i -= 1;
        } else {
            ops.push(EditOp::Insert);
            j -= 1;
        }
    }
    ops.reverse();
    ops
}

// Consecutive non-equal ops collapse into a single change record: deletions
// and insertions together mean a rewrite, otherwise pure addition/removal.
fn group_script(script: &[EditOp], old: &[Chunk], new: &[Chunk]) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut old_pos = 0usize;
    let mut new_pos = 0usize;
    let mut pending_old: Vec<usize> = Vec::new();
    let mut pending_new: Vec<usize> = Vec::new();

    let mut flush = |pending_old: &mut Vec<usize>, pending_new: &mut Vec<usize>| {
        if pending_old.is_empty() && pending_new.is_empty() {
            return;
        }
        let kind = match (pending_old.is_empty(), pending_new.is_empty()) {
            (false, false) => ChangeKind::Modified,
            (true, false) => ChangeKind::Added,
            (false, true) => ChangeKind::Removed,
            (true, true) => return,
        };
        let old_chunk_ids: Vec<String> =
            pending_old.iter().map(|&i| old[i].id.clone()).collect();
        let new_chunk_ids: Vec<String> =
            pending_new.iter().map(|&j| new[j].id.clone()).collect();
        let summary = group_summary(kind, pending_old, pending_new, old, new);
        events.push(ChangeEvent {
            kind,
            old_chunk_ids,
            new_chunk_ids,
            summary,
        });
        pending_old.clear();
        pending_new.clear();
    };

    for op in script {
        match op {
            EditOp::Equal => {
                flush(&mut pending_old, &mut pending_new);
                old_pos += 1;
                new_pos += 1;
            }
            EditOp::Delete => {
                pending_old.push(old_pos);
                old_pos += 1;
            }
            EditOp::Insert => {
                pending_new.push(new_pos);
                new_pos += 1;
            }
        }
    }
    flush(&mut pending_old, &mut pending_new);

    events
}

fn group_summary(
    kind: ChangeKind,
    pending_old: &[usize],
    pending_new: &[usize],
    old: &[Chunk],
    new: &[Chunk],
) -> String {
    let titles = |indices: &[usize], chunks: &[Chunk]| -> String {
        indices
            .iter()
            .map(|&i| chunks[i].title.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    match kind {
        ChangeKind::Added => format!("added: {}", titles(pending_new, new)),
        ChangeKind::Removed => format!("removed: {}", titles(pending_old, old)),
        ChangeKind::Modified => format!(
            "modified: {} => {}",
            titles(pending_old, old),
            titles(pending_new, new)
        ),
    }
}

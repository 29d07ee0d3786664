//! Move detection.
//!
//! A deleted path and an inserted path with the same fingerprint are one
//! relocated file. When several candidates share a fingerprint, each side is
//! ordered by (path length, path) and paired positionally; leftovers stay
//! plain deletes or inserts. The pairing depends only on the candidate path
//! sets, never on scan or hash completion order.
//!
//! Moves are then ordered so that none lands on a path another move has yet
//! to vacate: `a -> q` runs after `q/r -> z`.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use crate::fingerprint::Fingerprint;
use crate::index::FileRecord;

#[derive(Debug, Default)]
pub(super) struct Paired {
    pub moves: Vec<(FileRecord, FileRecord)>,
    pub deletes: Vec<FileRecord>,
    pub inserts: Vec<FileRecord>,
}

fn shortest_first(a: &FileRecord, b: &FileRecord) -> Ordering {
    a.path
        .len()
        .cmp(&b.path.len())
        .then_with(|| a.path.cmp(&b.path))
}

pub(super) fn pair_moves(deletes: Vec<FileRecord>, inserts: Vec<FileRecord>) -> Paired {
    let mut groups: BTreeMap<Fingerprint, (Vec<FileRecord>, Vec<FileRecord>)> = BTreeMap::new();
    for record in deletes {
        groups.entry(record.fingerprint.clone()).or_default().0.push(record);
    }
    for record in inserts {
        groups.entry(record.fingerprint.clone()).or_default().1.push(record);
    }

    let mut paired = Paired::default();
    for (mut gone, mut fresh) in groups.into_values() {
        gone.sort_by(shortest_first);
        fresh.sort_by(shortest_first);
        let n = gone.len().min(fresh.len());
        let unmatched_gone = gone.split_off(n);
        let unmatched_fresh = fresh.split_off(n);
        paired.moves.extend(gone.into_iter().zip(fresh));
        paired.deletes.extend(unmatched_gone);
        paired.inserts.extend(unmatched_fresh);
    }

    paired.moves.sort_by(|a, b| a.0.path.cmp(&b.0.path));
    paired.moves = order_moves(paired.moves);
    paired.deletes.sort_by(|a, b| a.path.cmp(&b.path));
    paired.inserts.sort_by(|a, b| a.path.cmp(&b.path));
    paired
}

/// Paths in `held` that keep `path` from being created as a file: the path
/// itself, anything below it, and any of its ancestors.
pub(crate) fn blockers<'a>(held: &'a BTreeSet<String>, path: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    if let Some(p) = held.get(path) {
        found.push(p.as_str());
    }
    let prefix = format!("{path}/");
    found.extend(
        held.range(prefix.clone()..)
            .take_while(|p| p.starts_with(&prefix))
            .map(String::as_str),
    );
    for (i, _) in path.match_indices('/') {
        if let Some(p) = held.get(&path[..i]) {
            found.push(p.as_str());
        }
    }
    found
}

/// Topological order over "must vacate first" edges. Among ready moves the
/// one listed first wins. A cycle has no ready move, so the first remaining
/// one goes anyway and the caller has to stage it.
fn order_moves(moves: Vec<(FileRecord, FileRecord)>) -> Vec<(FileRecord, FileRecord)> {
    let n = moves.len();
    let sources: BTreeSet<String> = moves.iter().map(|(from, _)| from.path.clone()).collect();
    let by_source: HashMap<&str, usize> = moves
        .iter()
        .enumerate()
        .map(|(i, (from, _))| (from.path.as_str(), i))
        .collect();

    let mut waiting = vec![0usize; n];
    let mut frees: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, (_, to)) in moves.iter().enumerate() {
        for source in blockers(&sources, &to.path) {
            if let Some(&j) = by_source.get(source) {
                if j != i {
                    waiting[i] += 1;
                    frees[j].push(i);
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> =
        (0..n).filter(|&i| waiting[i] == 0).map(Reverse).collect();
    let mut done = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let next = match ready.pop() {
            Some(Reverse(i)) => i,
            None => match (0..n).find(|&i| !done[i]) {
                Some(i) => i,
                None => break,
            },
        };
        if done[next] {
            continue;
        }
        done[next] = true;
        order.push(next);
        for &k in &frees[next] {
            waiting[k] -= 1;
            if waiting[k] == 0 && !done[k] {
                ready.push(Reverse(k));
            }
        }
    }

    let mut slots: Vec<Option<(FileRecord, FileRecord)>> = moves.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprinter;
    use crate::index::{FileMeta, parse_timestamp};

    fn rec(path: &str, content: &str) -> FileRecord {
        let meta = FileMeta {
            size: content.len() as u64,
            modified: parse_timestamp("2020-01-01T00:00:00Z").unwrap(),
        };
        FileRecord::new(path, meta, Fingerprinter::default().digest_bytes(content.as_bytes()))
    }

    fn pairs(paired: &Paired) -> Vec<(&str, &str)> {
        paired
            .moves
            .iter()
            .map(|(a, b)| (a.path.as_str(), b.path.as_str()))
            .collect()
    }

    #[test]
    fn test_duplicates_pair_shortest_path_first() {
        let paired = pair_moves(
            vec![rec("z/long/one", "X"), rec("a", "X"), rec("mm", "X")],
            vec![rec("c/c", "X"), rec("b", "X")],
        );
        assert_eq!(pairs(&paired), [("a", "b"), ("mm", "c/c")]);
        assert_eq!(paired.deletes.len(), 1);
        assert_eq!(paired.deletes[0].path, "z/long/one");
        assert!(paired.inserts.is_empty());
    }

    #[test]
    fn test_equal_length_falls_back_to_lexicographic() {
        let paired = pair_moves(
            vec![rec("d2", "X"), rec("d1", "X")],
            vec![rec("n2", "X"), rec("n1", "X"), rec("n3", "X")],
        );
        assert_eq!(pairs(&paired), [("d1", "n1"), ("d2", "n2")]);
        assert_eq!(paired.inserts[0].path, "n3");
    }

    #[test]
    fn test_blockers_cover_path_descendants_and_ancestors() {
        let held: BTreeSet<String> = ["q", "q/r", "q/r/s", "qq", "x/y"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(blockers(&held, "q"), ["q", "q/r", "q/r/s"]);
        assert_eq!(blockers(&held, "x/y/z"), ["x/y"]);
        assert!(blockers(&held, "x").contains(&"x/y"));
        assert!(blockers(&held, "z").is_empty());
    }

    #[test]
    fn test_move_waits_for_the_one_vacating_its_destination() {
        let paired = pair_moves(
            vec![rec("a", "A"), rec("q/r", "R")],
            vec![rec("q", "A"), rec("z", "R")],
        );
        assert_eq!(pairs(&paired), [("q/r", "z"), ("a", "q")]);
    }

    #[test]
    fn test_move_chain_runs_back_to_front() {
        // a -> b -> c -> d: each destination is still held until its own
        // source has moved on.
        let paired = pair_moves(
            vec![rec("a", "1"), rec("b", "2"), rec("c", "3")],
            vec![rec("b", "1"), rec("c", "2"), rec("d", "3")],
        );
        assert_eq!(pairs(&paired), [("c", "d"), ("b", "c"), ("a", "b")]);
    }

    #[test]
    fn test_cycle_still_yields_every_move() {
        let paired = pair_moves(
            vec![rec("a/x", "X"), rec("q/r", "R")],
            vec![rec("q", "X"), rec("a", "R")],
        );
        assert_eq!(pairs(&paired), [("a/x", "q"), ("q/r", "a")]);
    }

    #[test]
    fn test_different_content_never_pairs() {
        let paired = pair_moves(vec![rec("a", "X")], vec![rec("b", "Y")]);
        assert!(paired.moves.is_empty());
        assert_eq!(paired.deletes.len(), 1);
        assert_eq!(paired.inserts.len(), 1);
    }
}

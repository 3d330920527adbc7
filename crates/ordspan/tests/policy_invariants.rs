//! Property/fuzz-style invariants for interval map operations.
//!
//! This suite exercises random operation streams against the public
//! registry/map API and asserts the policy invariants, a reference coverage
//! model, and pin accounting after each mutation.

use std::cmp::Ordering;

use ordspan::{DomainRegistry, Handle, Interval, IntervalMap, MergePolicy, Position};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    fn choose_index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        (self.next_u64() % len as u64) as usize
    }

    fn choose_bool(&mut self) -> bool {
        (self.next_u64() & 1) == 0
    }
}

const POLICIES: [MergePolicy; 3] = [
    MergePolicy::Joining,
    MergePolicy::Separating,
    MergePolicy::Splitting,
];

fn domain(n: u32) -> (DomainRegistry<u32>, Vec<Handle>) {
    let mut reg = DomainRegistry::new();
    let handles = (0..n).map(|i| reg.push_back(i)).collect();
    (reg, handles)
}

/// Scan the whole map: entries non-empty, sorted, disjoint; under Joining no
/// order-adjacent pair holds equal values.
fn assert_invariants(map: &IntervalMap<char>, reg: &DomainRegistry<u32>, policy: MergePolicy) {
    let entries: Vec<(Handle, Handle, char)> = map
        .iter()
        .map(|(iv, v)| (iv.lower(), iv.upper(), *v))
        .collect();
    for (lo, hi, _) in &entries {
        assert_ne!(
            reg.compare(*lo, *hi).unwrap(),
            Ordering::Greater,
            "entry covers at least one element"
        );
    }
    for pair in entries.windows(2) {
        let (_, hi_a, value_a) = pair[0];
        let (lo_b, _, value_b) = pair[1];
        assert_eq!(
            reg.compare(hi_a, lo_b).unwrap(),
            Ordering::Less,
            "entries are sorted and disjoint"
        );
        if policy == MergePolicy::Joining {
            let adjacent = reg.successor(hi_a).unwrap() == Some(lo_b);
            assert!(
                !(adjacent && value_a == value_b),
                "joining map holds adjacent equal entries"
            );
        }
    }
}

/// Random insert/erase streams against a per-element coverage model.
///
/// The Joining map runs with the default combine ("new value wins"), so all
/// three policies must produce identical element coverage; they differ only
/// in entry structure, which `assert_invariants` checks.
#[test]
fn op_stream_matches_coverage_model() {
    const ELEMENTS: usize = 12;
    const OPS: usize = 200;
    let values = ['A', 'B', 'C'];

    for policy in POLICIES {
        for seed in 0..8u64 {
            let mut rng = Lcg::new(seed * 3 + 1);
            let (mut reg, handles) = domain(ELEMENTS as u32);
            let mut map = IntervalMap::new(&reg, policy);
            let mut model: Vec<Option<char>> = vec![None; ELEMENTS];

            for _ in 0..OPS {
                let i = rng.choose_index(ELEMENTS);
                let j = rng.choose_index(ELEMENTS);
                let (lo, hi) = (i.min(j), i.max(j));
                let probe = Interval::new(handles[lo], handles[hi]);

                if rng.choose_bool() {
                    let value = values[rng.choose_index(values.len())];
                    map.insert(&mut reg, probe, value).unwrap();
                    for covered in &mut model[lo..=hi] {
                        *covered = Some(value);
                    }
                    if policy == MergePolicy::Splitting {
                        // Freshly introduced boundaries must appear as entry
                        // boundaries: nothing may have merged across them.
                        assert!(map.iter().any(|(iv, _)| iv.lower() == handles[lo]));
                        assert!(map.iter().any(|(iv, _)| iv.upper() == handles[hi]));
                    }
                } else {
                    map.erase(&mut reg, probe).unwrap();
                    for covered in &mut model[lo..=hi] {
                        *covered = None;
                    }
                }

                assert_invariants(&map, &reg, policy);
                for (k, expected) in model.iter().enumerate() {
                    assert_eq!(
                        map.get(&reg, handles[k]).unwrap(),
                        expected.as_ref(),
                        "coverage mismatch at element {k} (policy {policy:?}, seed {seed})"
                    );
                }
            }

            // Pin accounting: a cleared map must leave every element free.
            map.clear(&mut reg).unwrap();
            for handle in handles {
                reg.remove(handle).unwrap();
            }
            assert!(reg.is_empty());
        }
    }
}

/// Interleave domain mutation with map mutation: grow the domain at random
/// positions, remove unpinned elements, and keep asserting the structural
/// invariants. Removing an element strictly inside an entry's span is legal
/// (the map pins endpoints only) and must not disturb entry ordering.
#[test]
fn op_stream_with_domain_mutation() {
    for policy in POLICIES {
        for seed in 0..6u64 {
            let mut rng = Lcg::new(seed.wrapping_mul(0x51F3) + 7);
            let (mut reg, mut handles) = domain(8);
            let mut map = IntervalMap::new(&reg, policy);
            let mut next_value = 100u32;

            for _ in 0..150 {
                match rng.choose_index(5) {
                    // Grow the domain next to a random element.
                    0 => {
                        let anchor = handles[rng.choose_index(handles.len())];
                        let at = if rng.choose_bool() {
                            Position::Before(anchor)
                        } else {
                            Position::After(anchor)
                        };
                        let h = reg.insert(next_value, at).unwrap();
                        next_value += 1;
                        handles.push(h);
                    }
                    // Try to shrink it; pinned endpoints must refuse.
                    1 if handles.len() > 2 => {
                        let idx = rng.choose_index(handles.len());
                        if reg.remove(handles[idx]).is_ok() {
                            handles.swap_remove(idx);
                        }
                    }
                    2 => {
                        let a = handles[rng.choose_index(handles.len())];
                        let b = handles[rng.choose_index(handles.len())];
                        let value = ['A', 'B'][rng.choose_index(2)];
                        // Reversed probes are empty intervals: accepted no-ops.
                        map.insert(&mut reg, Interval::new(a, b), value).unwrap();
                    }
                    _ => {
                        let a = handles[rng.choose_index(handles.len())];
                        let b = handles[rng.choose_index(handles.len())];
                        map.erase(&mut reg, Interval::new(a, b)).unwrap();
                    }
                }
                assert_invariants(&map, &reg, policy);
            }

            map.clear(&mut reg).unwrap();
            for handle in handles {
                reg.remove(handle).unwrap();
            }
        }
    }
}

proptest! {
    /// After one insert, every element inside the interval reads the value
    /// and every element outside is untouched.
    #[test]
    fn insert_round_trip(i in 0usize..10, j in 0usize..10, policy_idx in 0usize..3) {
        let (lo, hi) = (i.min(j), i.max(j));
        let (mut reg, handles) = domain(10);
        let mut map = IntervalMap::new(&reg, POLICIES[policy_idx]);
        map.insert(&mut reg, Interval::new(handles[lo], handles[hi]), 'X').unwrap();
        for (k, handle) in handles.iter().enumerate() {
            let expected = (lo <= k && k <= hi).then_some(&'X');
            prop_assert_eq!(map.get(&reg, *handle).unwrap(), expected);
        }
    }

    /// Re-issuing an insert changes nothing, under every policy.
    #[test]
    fn repeated_insert_is_idempotent(
        a in 0usize..10,
        b in 0usize..10,
        c in 0usize..10,
        d in 0usize..10,
        policy_idx in 0usize..3,
    ) {
        let (mut reg, handles) = domain(10);
        let mut map = IntervalMap::new(&reg, POLICIES[policy_idx]);
        let first = Interval::new(handles[a.min(b)], handles[a.max(b)]);
        let second = Interval::new(handles[c.min(d)], handles[c.max(d)]);
        map.insert(&mut reg, first, 'X').unwrap();
        map.insert(&mut reg, second, 'Y').unwrap();

        let once: Vec<_> = map.iter().map(|(iv, v)| (iv.lower(), iv.upper(), *v)).collect();
        map.insert(&mut reg, second, 'Y').unwrap();
        let twice: Vec<_> = map.iter().map(|(iv, v)| (iv.lower(), iv.upper(), *v)).collect();
        prop_assert_eq!(once, twice);
    }
}

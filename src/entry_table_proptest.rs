#![cfg(test)]

// Property tests for EntryTable kept inside the crate so they can reach the
// crate-private index.

use crate::entry_table::{EntryTable, Handle, InsertError};
use core::hash::BuildHasher;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hasher;

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    Remove(usize),
    Find(usize),
    Contains(String),
    Lookup(usize),
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            idx.clone().prop_map(OpI::Remove),
            idx.clone().prop_map(OpI::Find),
            prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(OpI::Contains),
            idx.clone().prop_map(OpI::Lookup),
            Just(OpI::Iterate),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

// State-machine equivalence against std::collections::HashMap:
// - duplicate keys are rejected; a successful insert yields a stable handle;
// - `find`/`contains_key`/`lookup` agree with the model;
// - `remove(handle)` returns the owned pair and invalidates the handle;
// - iteration yields exactly the model's keys;
// - stale handles never resolve; `len`/`is_empty` track the model.
fn run_state_machine<S: BuildHasher>(
    mut sut: EntryTable<i32, S>,
    pool: &[String],
    ops: Vec<OpI>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<String, i32> = HashMap::new();
    let mut live: HashMap<String, Handle> = HashMap::new();
    let mut stale: Vec<Handle> = Vec::new();

    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = pool[i].clone();
                let already = model.contains_key(&k);
                match sut.insert(k.clone(), v) {
                    Ok(h) => {
                        prop_assert!(!already, "insert must fail on duplicate");
                        prop_assert!(live.insert(k.clone(), h).is_none());
                        model.insert(k, v);
                    }
                    Err(InsertError::DuplicateKey) => {
                        prop_assert!(already, "duplicate error only when key exists");
                    }
                }
            }
            OpI::Remove(i) => {
                let k = &pool[i];
                if let Some(h) = live.remove(k) {
                    let (kk, vv) = sut.remove(h).expect("handle valid for removal");
                    prop_assert_eq!(&kk, k);
                    prop_assert_eq!(Some(vv), model.remove(k));
                    stale.push(h);
                } else {
                    prop_assert!(sut.find(k).is_none());
                }
            }
            OpI::Find(i) => {
                let k = &pool[i];
                let found = sut.find(k);
                prop_assert_eq!(found.is_some(), model.contains_key(k));
                if let Some(h) = found {
                    prop_assert_eq!(Some(&h), live.get(k));
                }
            }
            OpI::Contains(s) => {
                prop_assert_eq!(sut.contains_key(&s), model.contains_key(&s));
            }
            OpI::Lookup(i) => {
                let k = &pool[i];
                prop_assert_eq!(sut.lookup(k), model.get(k));
            }
            OpI::Iterate => {
                let s_keys: BTreeSet<String> = sut.iter().map(|(_, k, _)| k.to_string()).collect();
                let k_keys: BTreeSet<String> = sut.keys().map(str::to_string).collect();
                let m_keys: BTreeSet<String> = model.keys().cloned().collect();
                prop_assert_eq!(&s_keys, &m_keys);
                prop_assert_eq!(k_keys, m_keys);
            }
        }

        for &h in &stale {
            prop_assert!(sut.get(h).is_none());
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
    }
    Ok(())
}

// Collision variant using a constant hasher to stress equality resolution.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_state_machine(EntryTable::new(), &pool, ops)?;
    }

    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_state_machine(EntryTable::with_hasher(ConstBuildHasher), &pool, ops)?;
    }
}

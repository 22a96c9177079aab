#![cfg(test)]

// Property tests for ChainedMap kept inside the crate so they can reach
// the structural accessors without widening the public surface.

use crate::chained_map::ChainedMap;
use crate::strategy::{CStrEq, KeyEquality, KeyHasher};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeMap, HashMap};

// Pool-indexed operations: indices shrink toward earlier keys, the pool
// shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Set(usize, i32),
    Remove(usize),
    Get(usize),
    Mutate(usize, i32),
    Retain(i32),
    Iterate,
    StopAt(usize),
    Clear,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=12).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Set(i, v)),
            3 => idx.clone().prop_map(Op::Remove),
            3 => idx.clone().prop_map(Op::Get),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            1 => (2i32..5).prop_map(Op::Retain),
            1 => Just(Op::Iterate),
            1 => idx.clone().prop_map(Op::StopAt),
            1 => Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// State-machine equivalence against std::collections::HashMap:
// - `set` returns the model's previous value; `get`/`remove` agree with it.
// - `retain` drops exactly the entries the predicate rejects.
// - iteration yields each live entry once with the model's value.
// - an early stop reports no entry after the one that stopped it.
// - bucket count stays a power of two, never shrinks, and the load factor
//   stays at or below 0.75.
fn run_ops<H, E>(
    mut sut: ChainedMap<String, i32, H, E>,
    pool: &[String],
    ops: Vec<Op>,
) -> Result<(), TestCaseError>
where
    H: KeyHasher<String>,
    E: KeyEquality<String>,
{
    let mut model: HashMap<String, i32> = HashMap::new();
    let mut buckets = sut.bucket_count();

    for op in ops {
        match op {
            Op::Set(i, v) => {
                let k = pool[i].clone();
                let prev = sut.set(k.clone(), v).expect("entry allocation");
                prop_assert_eq!(prev, model.insert(k, v));
            }
            Op::Remove(i) => {
                prop_assert_eq!(sut.remove(&pool[i]), model.remove(&pool[i]));
            }
            Op::Get(i) => {
                prop_assert_eq!(sut.get(&pool[i]), model.get(&pool[i]));
                prop_assert_eq!(sut.contains_key(&pool[i]), model.contains_key(&pool[i]));
            }
            Op::Mutate(i, d) => {
                if let Some(v) = sut.get_mut(&pool[i]) {
                    *v = v.wrapping_add(d);
                }
                if let Some(v) = model.get_mut(&pool[i]) {
                    *v = v.wrapping_add(d);
                }
            }
            Op::Retain(m) => {
                sut.retain(|_, v| v.rem_euclid(m) != 0);
                model.retain(|_, v| v.rem_euclid(m) != 0);
            }
            Op::Iterate => {
                let seen: BTreeMap<String, i32> =
                    sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
                let expected: BTreeMap<String, i32> =
                    model.iter().map(|(k, v)| (k.clone(), *v)).collect();
                prop_assert_eq!(sut.iter().count(), model.len());
                prop_assert_eq!(seen, expected);
            }
            Op::StopAt(i) => {
                let mut visited = 0usize;
                let mut stopped = false;
                let mut after_stop = 0usize;
                sut.iterate(|k, _| {
                    if stopped {
                        after_stop += 1;
                    }
                    visited += 1;
                    if *k == pool[i] {
                        stopped = true;
                        return false;
                    }
                    true
                });
                prop_assert_eq!(after_stop, 0);
                prop_assert_eq!(stopped, model.contains_key(&pool[i]));
                if !stopped {
                    prop_assert_eq!(visited, model.len());
                }
            }
            Op::Clear => {
                sut.clear();
                model.clear();
            }
        }

        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        prop_assert!(sut.bucket_count().is_power_of_two());
        prop_assert!(sut.bucket_count() >= buckets, "bucket array never shrinks");
        prop_assert!(sut.load_factor() <= 0.75);
        buckets = sut.bucket_count();
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario(), hint in 0usize..20) {
        let sut: ChainedMap<String, i32> = ChainedMap::with_capacity(hint).unwrap();
        run_ops(sut, &pool, ops)?;
    }
}

// Same invariants with every key in one chain: stresses equality probing,
// head/tail unlinking, and relinking during growth.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let sut: ChainedMap<String, i32, _, CStrEq> =
            ChainedMap::with_capacity_and_hasher(0, |_: &String| -1).unwrap();
        run_ops(sut, &pool, ops)?;
    }
}

// Construction: bucket count is the smallest power of two that holds the
// hint under a 0.75 load factor.
proptest! {
    #[test]
    fn prop_bucket_count_for_hint(hint in 0usize..100_000) {
        let m: ChainedMap<String, i32> = ChainedMap::with_capacity(hint).unwrap();
        let buckets = m.bucket_count();
        let min = (hint * 4).div_ceil(3).max(1);
        prop_assert!(buckets.is_power_of_two());
        prop_assert!(buckets >= min);
        prop_assert!(buckets == 1 || buckets / 2 < min);
    }
}

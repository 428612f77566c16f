use livepatch_runtime::{DetourId, DetourTable, MethodHandle, Priority};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Install { original: u64, replacement: u64, priority: i32 },
    Remove(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4u64, 10..20u64, prop_oneof![Just(0i32), Just(5), Just(i32::MAX)]).prop_map(
            |(original, replacement, priority)| Op::Install {
                original,
                replacement,
                priority,
            }
        ),
        (0..16usize).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn prop_resolve_matches_model(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let table = DetourTable::new();
        // (id, original, replacement, priority) in install order
        let mut model: Vec<(DetourId, u64, u64, i32)> = Vec::new();

        for op in ops {
            match op {
                Op::Install { original, replacement, priority } => {
                    let id = table.install(
                        MethodHandle::from_raw(original),
                        MethodHandle::from_raw(replacement),
                        Priority(priority),
                    );
                    model.push((id, original, replacement, priority));
                }
                Op::Remove(index) => {
                    if index < model.len() {
                        let (id, ..) = model.remove(index);
                        prop_assert!(table.remove(id));
                    }
                }
            }
        }

        prop_assert_eq!(table.len(), model.len());
        for original in 0..4u64 {
            // highest priority, then latest install
            let expected = model
                .iter()
                .enumerate()
                .filter(|(_, d)| d.1 == original)
                .max_by_key(|(order, d)| (d.3, *order))
                .map_or(original, |(_, d)| d.2);
            prop_assert_eq!(
                table.resolve(MethodHandle::from_raw(original)),
                MethodHandle::from_raw(expected)
            );
        }
    }
}

#[test]
fn removing_unknown_detour_is_harmless() {
    let table = DetourTable::new();
    let id = table.install(
        MethodHandle::from_raw(1),
        MethodHandle::from_raw(2),
        Priority::NORMAL,
    );
    assert!(table.remove(id));
    assert!(!table.remove(id));
    assert!(table.is_empty());
}

use std::thread;

use pedicel::registry::Registry;

#[test]
fn entries_drain_in_registration_order() {
	let registry = Registry::new();
	let a = registry.add("a").unwrap();
	let b = registry.add("b").unwrap();
	let _c = registry.add("c").unwrap();
	assert_eq!(registry.len(), 3);
	assert_ne!(a, b);

	let drained: Vec<&str> = registry.seal().into_iter().map(|(_, entry)| entry).collect();
	assert_eq!(drained, ["a", "b", "c"]);
}

#[test]
fn removal_is_by_handle_and_fails_after_seal() {
	let registry = Registry::new();
	let a = registry.add("a").unwrap();
	let b = registry.add("b").unwrap();

	assert_eq!(registry.remove(a), Some("a"));
	assert_eq!(registry.remove(a), None);

	let _ = registry.seal();
	assert_eq!(registry.remove(b), None);
}

#[test]
fn seal_is_idempotent() {
	let registry = Registry::new();
	let _ = registry.add("a").unwrap();
	assert_eq!(registry.seal().len(), 1);
	assert!(registry.seal().is_empty());
	assert!(registry.is_sealed());
}

#[test]
fn add_after_seal_returns_the_entry_to_the_caller() {
	let registry = Registry::new();
	let _ = registry.seal();
	assert_eq!(registry.add("late"), Err("late"));
}

#[test]
fn born_sealed_refuses_storage() {
	let registry = Registry::new_sealed();
	assert_eq!(registry.add("x"), Err("x"));
	assert!(registry.seal().is_empty());
}

#[test]
fn snapshot_leaves_entries_registered() {
	let registry = Registry::new();
	let _ = registry.add(1).unwrap();
	let _ = registry.add(2).unwrap();
	assert_eq!(registry.snapshot(), [1, 2]);
	assert_eq!(registry.len(), 2);
}

#[test]
fn concurrent_adds_race_the_seal_without_loss_or_duplication() {
	for _ in 0..64 {
		let registry = Registry::new();
		let mut inline = 0_usize;
		let mut stored = 0_usize;
		thread::scope(|scope| {
			let adder = scope.spawn(|| {
				let mut refused = 0_usize;
				for n in 0..16 {
					if registry.add(n).is_err() {
						refused += 1;
					}
				}
				refused
			});
			let sealer = scope.spawn(|| registry.seal().len());
			inline = adder.join().unwrap();
			stored = sealer.join().unwrap();
		});
		// Every add either landed in a drain or was handed back inline.
		assert_eq!(inline + stored, 16);
	}
}

//! Property-based invariant tests for observation tracking over the store.
//!
//! 1. A tracking fires exactly once if any key it read changed after it was
//!    installed, and never otherwise.
//! 2. Trackings of one key never fire for writes to another key.
//! 3. Every bridge bound to a key reads the same value as the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use prefkit_runtime::{Key, ObservableDefault, ObservationRegistrar, PreferenceStore};
use prefkit_runtime::with_observation_tracking;
use proptest::prelude::*;

const KEYS: [&str; 3] = ["animalKey", "colorKey", "sizeKey"];

fn writes_strategy() -> impl Strategy<Value = Vec<(usize, u8)>> {
    proptest::collection::vec((0usize..KEYS.len(), 0u8..4), 0..32)
}

proptest! {
    #[test]
    fn trackings_fire_once_per_changed_key(writes in writes_strategy()) {
        let store = PreferenceStore::in_memory();
        let registrar = ObservationRegistrar::new();
        let bridges: Vec<ObservableDefault<u8>> = KEYS
            .iter()
            .map(|name| ObservableDefault::bind(&registrar, &store, Key::new(*name, 0u8)))
            .collect();
        // A second object bound to the same keys.
        let mirrors: Vec<ObservableDefault<u8>> = KEYS
            .iter()
            .map(|name| ObservableDefault::bind(&ObservationRegistrar::new(), &store, Key::new(*name, 0u8)))
            .collect();

        let fired: Vec<Arc<AtomicUsize>> = mirrors
            .iter()
            .map(|mirror| {
                let count = Arc::new(AtomicUsize::new(0));
                let count_clone = Arc::clone(&count);
                with_observation_tracking(|| mirror.get(), move || {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                });
                count
            })
            .collect();

        let mut changed = [false; KEYS.len()];
        let mut model: [Option<u8>; KEYS.len()] = [None; KEYS.len()];
        for (index, value) in writes {
            if model[index] != Some(value) {
                changed[index] = true;
            }
            model[index] = Some(value);
            bridges[index].set(value);
        }

        for index in 0..KEYS.len() {
            prop_assert_eq!(fired[index].load(Ordering::SeqCst), usize::from(changed[index]));
            prop_assert_eq!(bridges[index].get(), model[index].unwrap_or(0));
            prop_assert_eq!(mirrors[index].get(), bridges[index].get());
        }
    }
}

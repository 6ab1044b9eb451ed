//! Observation across threads sharing one store.

use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use prefkit_runtime::{
    Key, ObservableDefault, ObservationRegistrar, PreferenceStore, with_observation_tracking,
};

fn animal_key() -> Key<String> {
    Key::new("animalKey", "cat".into())
}

#[test]
fn write_on_other_thread_confirms_tracking() {
    let store = PreferenceStore::in_memory();
    let model = ObservableDefault::bind(&ObservationRegistrar::new(), &store, animal_key());

    let (tx, rx) = mpsc::channel();
    let seen = with_observation_tracking(
        || model.get(),
        move || {
            let _ = tx.send(thread::current().id());
        },
    );
    assert_eq!(seen, "cat");

    let writer = store.clone();
    let handle = thread::spawn(move || {
        writer.set_raw("animalKey", "unicorn".into());
        thread::current().id()
    });
    let writer_id = handle.join().unwrap();

    let fired_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(fired_on, writer_id);
    assert_eq!(model.get(), "unicorn");
    assert!(rx.try_recv().is_err());
}

#[test]
fn tracking_scopes_are_thread_local() {
    let store = PreferenceStore::in_memory();
    let registrar = ObservationRegistrar::new();
    let model = Arc::new(ObservableDefault::bind(&registrar, &store, animal_key()));
    let barrier = Arc::new(Barrier::new(2));

    // Reads on another thread while this thread is tracking are not recorded
    // by this thread's scope.
    let reader = {
        let model = Arc::clone(&model);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            model.get()
        })
    };

    with_observation_tracking(
        || {
            barrier.wait();
            thread::sleep(Duration::from_millis(10));
        },
        || {},
    );
    assert_eq!(reader.join().unwrap(), "cat");
    assert_eq!(registrar.observer_count(model.property_id()), 0);
}

#[test]
fn concurrent_writers_all_land() {
    let store = PreferenceStore::in_memory();
    let counter = Key::new("counter", 0u32);
    let model = ObservableDefault::bind(&ObservationRegistrar::new(), &store, counter.clone());
    let watch = store.watch(&counter);

    let handles: Vec<_> = (1..=8u32)
        .map(|n| {
            let store = store.clone();
            let counter = counter.clone();
            thread::spawn(move || store.set(&counter, n))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every writer changed the entry, so every write was delivered.
    let mut delivered: Vec<u32> = watch.drain().into_iter().map(|c| c.new).collect();
    delivered.sort_unstable();
    assert_eq!(delivered, (1..=8).collect::<Vec<_>>());
    assert!((1..=8).contains(&model.get()));
    assert_eq!(model.version(), 8);
}

//! Models bound to file-backed and process-wide stores.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use prefkit::prelude::*;
use prefkit::{StoreConfig, StoreDestination};
use serde::{Deserialize, Serialize};

/// Tests touching `PreferenceStore::standard()` must not overlap.
static STANDARD_LOCK: Mutex<()> = Mutex::new(());

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("prefkit_store=debug,prefkit_runtime=trace")
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Theme {
    Light,
    Dark,
    Custom { accent: String },
}

fn theme_key() -> Key<Theme> {
    Key::new("theme", Theme::Light)
}

fn shortcuts_key() -> Key<BTreeMap<String, String>> {
    Key::new("shortcuts", BTreeMap::new())
}

observable_model! {
    struct Appearance {
        theme: Theme = theme_key(),
        shortcuts: BTreeMap<String, String> = shortcuts_key(),
    }
}

#[test]
fn model_values_survive_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::in_memory()
        .with_destination(StoreDestination::File(dir.path().join("prefs.json")));

    {
        let store = config.build().unwrap();
        let appearance = Appearance::new(&store);
        appearance.theme.set(Theme::Custom {
            accent: "teal".into(),
        });
        appearance
            .shortcuts
            .modify(|map| map.insert("save".into(), "ctrl+s".into()));
    }

    let store = config.build().unwrap();
    let appearance = Appearance::new(&store);
    assert_eq!(
        appearance.theme.get(),
        Theme::Custom {
            accent: "teal".into()
        }
    );
    assert_eq!(
        appearance.shortcuts.get().get("save").map(String::as_str),
        Some("ctrl+s")
    );
}

#[test]
fn external_file_edit_notifies_model_after_reload() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.json");
    let store = StoreConfig::file(&path).build().unwrap();
    let appearance = Appearance::new(&store);
    appearance.theme.set(Theme::Dark);

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    with_observation_tracking(
        || appearance.theme.get(),
        move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        },
    );

    std::fs::write(&path, r#"{ "theme": "Light" }"#).unwrap();
    store.reload().unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(appearance.theme.get(), Theme::Light);
}

#[test]
fn undecodable_entry_reads_default() {
    let store = PreferenceStore::in_memory();
    let appearance = Appearance::new(&store);
    store.set_raw("theme", serde_json::json!({ "Unknown": 3 }));
    assert_eq!(appearance.theme.get(), Theme::Light);
    assert!(appearance.theme.is_default_value());
}

#[test]
fn standard_store_is_shared_and_resettable() {
    let _guard = STANDARD_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let store = PreferenceStore::standard();
    store.remove_all();

    let registry = KeyRegistry::new();
    let animal = registry
        .declare("animalKey", "cat".to_string())
        .unwrap();
    registry.write_defaults(store);

    let model1 = ObservableDefault::bind(&ObservationRegistrar::new(), store, animal.clone());
    let model2 = ObservableDefault::bind(
        &ObservationRegistrar::new(),
        PreferenceStore::standard(),
        animal.clone(),
    );
    assert_eq!(model1.get(), "cat");

    model2.set("unicorn".into());
    assert_eq!(model1.get(), "unicorn");

    registry.reset_in(store);
    assert_eq!(model1.get(), "cat");
    store.remove_all();
}

#[test]
fn without_propagation_keeps_trackings_armed() {
    let store = PreferenceStore::in_memory();
    let appearance = Appearance::new(&store);
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    with_observation_tracking(
        || appearance.theme.get(),
        move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        },
    );

    store.without_propagation(|| appearance.theme.set(Theme::Dark));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(appearance.theme.get(), Theme::Dark);

    appearance.theme.set(Theme::Light);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

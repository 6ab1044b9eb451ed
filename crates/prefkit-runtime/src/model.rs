#![forbid(unsafe_code)]

//! Declarative models of store-backed properties.

/// Declare a struct whose fields are [`ObservableDefault`] properties sharing
/// one [`ObservationRegistrar`].
///
/// Each field names its value type and the key expression it binds to. The
/// macro adds a private `registrar` field, a `new(&PreferenceStore)`
/// constructor that binds every field, and a `registrar()` accessor.
///
/// ```
/// use std::sync::LazyLock;
/// use prefkit_runtime::{Key, PreferenceStore, observable_model};
///
/// static ANIMAL: LazyLock<Key<String>> = LazyLock::new(|| Key::new("animalKey", "cat".into()));
///
/// fn color_key() -> Key<String> {
///     Key::new("colorKey", "blue".into())
/// }
///
/// observable_model! {
///     pub struct Settings {
///         pub animal: String = ANIMAL.clone(),
///         pub color: String = color_key(),
///     }
/// }
///
/// let store = PreferenceStore::in_memory();
/// let settings = Settings::new(&store);
/// assert_eq!(settings.animal.get(), "cat");
/// settings.color.set("purple".into());
/// assert_eq!(store.get(&color_key()), "purple");
/// ```
///
/// [`ObservableDefault`]: crate::reactive::ObservableDefault
/// [`ObservationRegistrar`]: crate::reactive::ObservationRegistrar
#[macro_export]
macro_rules! observable_model {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty = $key:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            registrar: $crate::reactive::ObservationRegistrar,
            $(
                $(#[$field_meta])*
                $field_vis $field: $crate::reactive::ObservableDefault<$ty>,
            )*
        }

        impl $name {
            /// Bind every property to `store`.
            #[allow(dead_code)]
            $vis fn new(store: &$crate::PreferenceStore) -> Self {
                let registrar = $crate::reactive::ObservationRegistrar::new();
                Self {
                    $(
                        $field: $crate::reactive::ObservableDefault::bind(&registrar, store, $key),
                    )*
                    registrar,
                }
            }

            /// Registrar shared by every property of this model.
            #[allow(dead_code)]
            $vis fn registrar(&self) -> &$crate::reactive::ObservationRegistrar {
                &self.registrar
            }
        }
    };
}

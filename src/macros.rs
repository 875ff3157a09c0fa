pub use enclose::*;

/// Builds a [`Cacheable`](crate::Cacheable) from an async fetch body.
///
/// Handles listed in parentheses are cloned into the fetch function and
/// again into every fetch it starts.
///
/// ```ignore
/// let user = cacheable!((client) pool.spawner() => client.user(42).await.map_err(CacheError::fetch));
/// ```
#[macro_export]
macro_rules! cacheable {
    (( $($name:ident),* ) $spawner:expr => $($b:tt)*) => {
        $crate::Cacheable::new(
            $spawner,
            $crate::macros::enclose!(($( $name ),*) move || $crate::macros::enclose!(($( $name ),*) async move { $($b)* })),
        )
    };
    ($spawner:expr => $($b:tt)*) => {
        $crate::Cacheable::new($spawner, move || async move { $($b)* })
    };
}

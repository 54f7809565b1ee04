use std::future::{Future, ready};
use std::marker::PhantomData;

use crate::arena::SlotIndex;

/// The collaborator contract of a [`SlotCache`](crate::SlotCache).
///
/// `E` is the element type callers look up; `?Sized` so a cache can be keyed
/// directly by `str` or `[u8]`.
pub trait SlotProvider<E: ?Sized> {
    /// Cached value. Callers receive clones; use `Arc<T>` for shared handles.
    type Value: Clone;
    type Error: std::error::Error + 'static;

    /// Key for `element`. Must be deterministic, and distinct for logically
    /// distinct elements.
    fn key_of(&self, element: &E) -> String;

    /// Acquire the resource for `element` in `slot`. Called exactly once per
    /// insertion, never on a hit.
    fn produce(
        &mut self,
        element: &E,
        slot: SlotIndex,
    ) -> impl Future<Output = Result<Self::Value, Self::Error>>;

    /// Undo whatever `produce` did for an evicted entry. Completes before the
    /// vacated slot is produced into again.
    fn release(
        &mut self,
        key: &str,
        value: Self::Value,
    ) -> impl Future<Output = Result<(), Self::Error>> {
        let _ = (key, value);
        ready(Ok(()))
    }
}

/// Releaser used by [`FnProvider::new`]: does nothing.
pub type NoRelease<V, Err> = fn(&str, V) -> Result<(), Err>;

/// A synchronous [`SlotProvider`] assembled from plain functions.
///
/// ```
/// use slotcache_core::{FnProvider, SlotCache};
/// use std::convert::Infallible;
///
/// let provider = FnProvider::new(
///     |name: &str| name.to_owned(),
///     |name: &str, slot| Ok::<_, Infallible>(format!("{name}@{slot}")),
/// );
/// let mut cache = SlotCache::with_capacity(provider, 2).unwrap();
/// let value = pollster::block_on(cache.get("x")).unwrap();
/// assert_eq!(value, "x@#0");
/// ```
pub struct FnProvider<E: ?Sized, V, Err, K, P, R = NoRelease<V, Err>> {
    key_of: K,
    produce: P,
    release: R,
    _marker: PhantomData<fn(&E) -> (V, Err)>,
}

impl<E, V, Err, K, P> FnProvider<E, V, Err, K, P>
where
    E: ?Sized,
    K: Fn(&E) -> String,
    P: FnMut(&E, SlotIndex) -> Result<V, Err>,
{
    pub fn new(key_of: K, produce: P) -> Self {
        Self {
            key_of,
            produce,
            release: |_, _| Ok(()),
            _marker: PhantomData,
        }
    }
}

impl<E: ?Sized, V, Err, K, P, R> FnProvider<E, V, Err, K, P, R> {
    /// Replace the releaser.
    pub fn with_release<R2>(self, release: R2) -> FnProvider<E, V, Err, K, P, R2>
    where
        R2: FnMut(&str, V) -> Result<(), Err>,
    {
        FnProvider {
            key_of: self.key_of,
            produce: self.produce,
            release,
            _marker: PhantomData,
        }
    }
}

impl<E, V, Err, K, P, R> SlotProvider<E> for FnProvider<E, V, Err, K, P, R>
where
    E: ?Sized,
    V: Clone,
    Err: std::error::Error + 'static,
    K: Fn(&E) -> String,
    P: FnMut(&E, SlotIndex) -> Result<V, Err>,
    R: FnMut(&str, V) -> Result<(), Err>,
{
    type Value = V;
    type Error = Err;

    fn key_of(&self, element: &E) -> String {
        (self.key_of)(element)
    }

    fn produce(&mut self, element: &E, slot: SlotIndex) -> impl Future<Output = Result<V, Err>> {
        ready((self.produce)(element, slot))
    }

    fn release(&mut self, key: &str, value: V) -> impl Future<Output = Result<(), Err>> {
        ready((self.release)(key, value))
    }
}

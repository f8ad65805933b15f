//! Deferred values.

use std::fmt;
use std::sync::Arc;

/// A computation evaluated on demand.
///
/// Used for values that are only knowable once the current transaction has
/// closed, chiefly the initial value of a cell defined through a loop. Each
/// [`Lazy::get`] runs the computation again; nothing is cached here.
pub struct Lazy<A> {
    f: Arc<dyn Fn() -> A + Send + Sync>,
}

impl<A: 'static> Lazy<A> {
    pub fn new(f: impl Fn() -> A + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// A lazy value that is already known.
    pub fn of(value: A) -> Self
    where
        A: Clone + Send + Sync,
    {
        Self::new(move || value.clone())
    }

    pub fn get(&self) -> A {
        (self.f)()
    }

    pub fn map<B: 'static>(&self, f: impl Fn(&A) -> B + Send + Sync + 'static) -> Lazy<B> {
        let me = self.clone();
        Lazy::new(move || f(&me.get()))
    }

    pub fn lift<B, C>(&self, b: &Lazy<B>, f: impl Fn(&A, &B) -> C + Send + Sync + 'static) -> Lazy<C>
    where
        B: 'static,
        C: 'static,
    {
        let (a, b) = (self.clone(), b.clone());
        Lazy::new(move || f(&a.get(), &b.get()))
    }

    pub fn lift3<B, C, D>(
        &self,
        b: &Lazy<B>,
        c: &Lazy<C>,
        f: impl Fn(&A, &B, &C) -> D + Send + Sync + 'static,
    ) -> Lazy<D>
    where
        B: 'static,
        C: 'static,
        D: 'static,
    {
        let (a, b, c) = (self.clone(), b.clone(), c.clone());
        Lazy::new(move || f(&a.get(), &b.get(), &c.get()))
    }

    pub fn lift4<B, C, D, E>(
        &self,
        b: &Lazy<B>,
        c: &Lazy<C>,
        d: &Lazy<D>,
        f: impl Fn(&A, &B, &C, &D) -> E + Send + Sync + 'static,
    ) -> Lazy<E>
    where
        B: 'static,
        C: 'static,
        D: 'static,
        E: 'static,
    {
        let (a, b, c, d) = (self.clone(), b.clone(), c.clone(), d.clone());
        Lazy::new(move || f(&a.get(), &b.get(), &c.get(), &d.get()))
    }
}

impl<A> Clone for Lazy<A> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<A> fmt::Debug for Lazy<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lazy { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn lazy_recomputes_on_each_get() {
        let calls = Arc::new(AtomicI32::new(0));
        let c = calls.clone();
        let lazy = Lazy::new(move || c.fetch_add(1, Ordering::SeqCst) + 1);

        assert_eq!(lazy.get(), 1);
        assert_eq!(lazy.get(), 2);
    }

    #[test]
    fn lazy_combinators() {
        let a = Lazy::of(3);
        let b = Lazy::of(4);
        let c = Lazy::of(5);

        assert_eq!(a.map(|x| x * 10).get(), 30);
        assert_eq!(a.lift(&b, |x, y| x + y).get(), 7);
        assert_eq!(a.lift3(&b, &c, |x, y, z| x * y * z).get(), 60);
        let label = Lazy::of("sum");
        assert_eq!(
            a.lift4(&b, &c, &label, |x, y, z, l| format!("{l} {}", x + y + z)).get(),
            "sum 12"
        );
    }
}

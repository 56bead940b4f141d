//! Cooperative cancellation
//!
//! The dispatcher polls a `CancellationSource` before validating a directive
//! and again before executing it. The backing store belongs to the caller.

use crate::models::Directive;
use std::collections::HashSet;
use std::sync::RwLock;

pub trait CancellationSource: Send + Sync {
    fn is_cancelled(&self, directive: &Directive) -> bool;
}

impl<F> CancellationSource for F
where
    F: Fn(&Directive) -> bool + Send + Sync,
{
    fn is_cancelled(&self, directive: &Directive) -> bool {
        self(directive)
    }
}

pub struct NeverCancel;

impl CancellationSource for NeverCancel {
    fn is_cancelled(&self, _directive: &Directive) -> bool {
        false
    }
}

/// Caller-managed set of cancelled directive indices, plus a cancel-all switch
#[derive(Default)]
pub struct CancelSet {
    inner: RwLock<CancelState>,
}

#[derive(Default)]
struct CancelState {
    indices: HashSet<usize>,
    all: bool,
}

impl CancelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, index: usize) {
        if let Ok(mut state) = self.inner.write() {
            state.indices.insert(index);
        }
    }

    pub fn cancel_all(&self) {
        if let Ok(mut state) = self.inner.write() {
            state.all = true;
        }
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.inner.write() {
            state.indices.clear();
            state.all = false;
        }
    }
}

impl CancellationSource for CancelSet {
    fn is_cancelled(&self, directive: &Directive) -> bool {
        self.inner
            .read()
            .map(|state| state.all || state.indices.contains(&directive.index))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_set() {
        let first = Directive::from_inner(0, "OPEN https://a.example");
        let second = Directive::from_inner(1, "CLOSE_TAB");
        let set = CancelSet::new();

        assert!(!set.is_cancelled(&first));
        set.cancel(1);
        assert!(!set.is_cancelled(&first));
        assert!(set.is_cancelled(&second));

        set.cancel_all();
        assert!(set.is_cancelled(&first));

        set.clear();
        assert!(!set.is_cancelled(&second));
    }

    #[test]
    fn test_closure_source() {
        let only_scrapes = |d: &Directive| d.keyword == "SCRAPE";
        assert!(only_scrapes.is_cancelled(&Directive::from_inner(0, "SCRAPE https://a.example")));
        assert!(!NeverCancel.is_cancelled(&Directive::from_inner(0, "SCRAPE https://a.example")));
    }
}

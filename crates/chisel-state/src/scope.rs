//! Run scopes: the per-run context owning every draft a recipe creates.
//!
//! Scopes form a strict stack per thread. Entering a run pushes a fresh scope
//! whose parent is the previous top; leaving pops it; revoking pops it and
//! permanently invalidates every draft it owns. Manual drafts pop their scope
//! at creation but keep it (and their drafts) alive until explicitly finished.

use crate::copy::StrictCopyMode;
use crate::draft::Draft;
use crate::patch::Patch;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Forward and inverse patch accumulators for one run.
#[derive(Default)]
pub(crate) struct PatchBufs {
    pub forward: Vec<Patch>,
    pub inverse: Vec<Patch>,
}

pub(crate) struct ScopeInner {
    parent: Option<Scope>,
    auto_freeze: bool,
    strict_copy: StrictCopyMode,
    can_auto_freeze: AtomicBool,
    unfinalized: AtomicUsize,
    drafts: Mutex<Vec<Draft>>,
    patches: Mutex<Option<PatchBufs>>,
}

/// Shared handle to a run scope.
#[derive(Clone)]
pub(crate) struct Scope {
    inner: Arc<ScopeInner>,
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };
}

impl Scope {
    fn new(
        parent: Option<Scope>,
        auto_freeze: bool,
        strict_copy: StrictCopyMode,
        with_patches: bool,
    ) -> Scope {
        Scope {
            inner: Arc::new(ScopeInner {
                parent,
                auto_freeze,
                strict_copy,
                can_auto_freeze: AtomicBool::new(true),
                unfinalized: AtomicUsize::new(0),
                drafts: Mutex::new(Vec::new()),
                patches: Mutex::new(with_patches.then(PatchBufs::default)),
            }),
        }
    }

    /// Push a fresh scope whose parent is the current top of the stack.
    pub fn enter(auto_freeze: bool, strict_copy: StrictCopyMode, with_patches: bool) -> Scope {
        let scope = Scope::new(Scope::current(), auto_freeze, strict_copy, with_patches);
        SCOPE_STACK.with(|stack| stack.borrow_mut().push(scope.clone()));
        scope
    }

    /// Create a scope that never joins the stack. Used for the inert draft
    /// handed to recipes running over non-container bases.
    pub fn detached(auto_freeze: bool, strict_copy: StrictCopyMode) -> Scope {
        Scope::new(None, auto_freeze, strict_copy, false)
    }

    /// The current top of this thread's scope stack.
    pub fn current() -> Option<Scope> {
        SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
    }

    #[inline]
    pub fn same(a: &Scope, b: &Scope) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Whether this scope has no enclosing run.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Pop this scope if it is the current top. Its drafts stay alive.
    pub fn leave(&self) {
        SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(top) = stack.last() {
                if Scope::same(top, self) {
                    stack.pop();
                }
            }
        });
    }

    /// Pop this scope and permanently invalidate every draft it owns.
    pub fn revoke(&self) {
        self.leave();
        let drafts = std::mem::take(&mut *self.inner.drafts.lock().unwrap());
        for draft in drafts {
            draft.revoke();
        }
    }

    pub fn register(&self, draft: &Draft) {
        self.inner.drafts.lock().unwrap().push(draft.clone());
    }

    pub fn first_draft(&self) -> Option<Draft> {
        self.inner.drafts.lock().unwrap().first().cloned()
    }

    pub fn draft_count(&self) -> usize {
        self.inner.drafts.lock().unwrap().len()
    }

    /// Seed the unfinalized-draft counter at the start of finalization.
    pub fn reset_unfinalized(&self) {
        self.inner
            .unfinalized
            .store(self.draft_count(), Ordering::Relaxed);
    }

    pub fn dec_unfinalized(&self) {
        let _ = self
            .inner
            .unfinalized
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn unfinalized(&self) -> usize {
        self.inner.unfinalized.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn auto_freeze_config(&self) -> bool {
        self.inner.auto_freeze
    }

    #[inline]
    pub fn strict_copy(&self) -> StrictCopyMode {
        self.inner.strict_copy
    }

    #[inline]
    pub fn can_auto_freeze(&self) -> bool {
        self.inner.can_auto_freeze.load(Ordering::Relaxed)
    }

    /// Clear auto-freeze permission; set when a cross-scope draft remains in
    /// this scope's output.
    pub fn clear_auto_freeze(&self) {
        self.inner.can_auto_freeze.store(false, Ordering::Relaxed);
    }

    pub fn patches_enabled(&self) -> bool {
        self.inner.patches.lock().unwrap().is_some()
    }

    /// Attach patch buffers late (manual drafts enable patches at finish).
    pub fn enable_patches(&self) {
        let mut guard = self.inner.patches.lock().unwrap();
        if guard.is_none() {
            *guard = Some(PatchBufs::default());
        }
    }

    pub fn with_patches<R>(&self, f: impl FnOnce(&mut PatchBufs) -> R) -> Option<R> {
        self.inner.patches.lock().unwrap().as_mut().map(f)
    }

    pub fn take_patches(&self) -> Option<(Vec<Patch>, Vec<Patch>)> {
        self.inner
            .patches
            .lock()
            .unwrap()
            .take()
            .map(|bufs| (bufs.forward, bufs.inverse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_links_parent_and_leave_pops() {
        assert!(Scope::current().is_none());
        let outer = Scope::enter(true, StrictCopyMode::Never, false);
        assert!(outer.is_root());
        let inner = Scope::enter(true, StrictCopyMode::Never, false);
        assert!(!inner.is_root());
        assert!(Scope::same(&Scope::current().unwrap(), &inner));

        inner.leave();
        assert!(Scope::same(&Scope::current().unwrap(), &outer));
        outer.leave();
        assert!(Scope::current().is_none());
    }

    #[test]
    fn test_leave_ignores_non_top() {
        let outer = Scope::enter(true, StrictCopyMode::Never, false);
        let inner = Scope::enter(true, StrictCopyMode::Never, false);
        outer.leave();
        assert!(Scope::same(&Scope::current().unwrap(), &inner));
        inner.leave();
        outer.leave();
        assert!(Scope::current().is_none());
    }

    #[test]
    fn test_patch_buffers() {
        let scope = Scope::detached(true, StrictCopyMode::Never);
        assert!(!scope.patches_enabled());
        assert!(scope.take_patches().is_none());

        scope.enable_patches();
        scope.with_patches(|bufs| {
            bufs.forward
                .push(crate::Patch::add(crate::path!("a"), crate::Value::Int(1)));
        });
        let (forward, inverse) = scope.take_patches().unwrap();
        assert_eq!(forward.len(), 1);
        assert!(inverse.is_empty());
    }
}

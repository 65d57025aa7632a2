//! Engine entry points: producing values, manual drafts, patch replay, and
//! per-instance configuration.

use crate::apply::apply_patch_list;
use crate::copy::StrictCopyMode;
use crate::draft::Draft;
use crate::error::{ChiselError, ChiselResult};
use crate::finalize::finish_run;
use crate::freeze::freeze as freeze_value;
use crate::patch::Patch;
use crate::path::Path;
use crate::scope::Scope;
use crate::value::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

/// A recipe's return: `None` keeps the (possibly mutated) root draft;
/// `Some(v)` replaces the result wholesale, with the *nothing* sentinel
/// standing for "the result is empty".
pub type RecipeResult = ChiselResult<Option<Value>>;

/// An engine instance: configuration plus the produce/apply entry points.
///
/// Most callers use the crate-level free functions, which delegate to a
/// process-wide default engine. Independent instances exist so tests and
/// embedders can flip configuration without affecting each other.
pub struct Engine {
    auto_freeze: AtomicBool,
    strict_copy: Mutex<StrictCopyMode>,
}

impl Engine {
    /// A fresh engine: auto-freeze on, plain shallow copies.
    pub fn new() -> Engine {
        Engine {
            auto_freeze: AtomicBool::new(true),
            strict_copy: Mutex::new(StrictCopyMode::Never),
        }
    }

    /// Enable or disable automatic deep-freezing of produced values.
    pub fn set_auto_freeze(&self, on: bool) {
        self.auto_freeze.store(on, Ordering::Relaxed);
    }

    /// Current auto-freeze setting.
    pub fn auto_freeze(&self) -> bool {
        self.auto_freeze.load(Ordering::Relaxed)
    }

    /// Choose how record shallow copies treat class accessors.
    pub fn set_strict_copy(&self, mode: StrictCopyMode) {
        *self.strict_copy.lock().unwrap() = mode;
    }

    /// Current strict-copy mode.
    pub fn strict_copy(&self) -> StrictCopyMode {
        *self.strict_copy.lock().unwrap()
    }

    /// Run `recipe` against a draft of `base` and return the new value.
    ///
    /// All unmodified substructure is shared with `base`, which is never
    /// mutated. On any error the scope is revoked, every draft is
    /// invalidated, and `base` is guaranteed unchanged.
    pub fn produce<F>(&self, base: Value, recipe: F) -> ChiselResult<Value>
    where
        F: FnOnce(&Draft) -> RecipeResult,
    {
        self.run(base, recipe, false).map(|(value, _)| value)
    }

    /// Like [`Engine::produce`], additionally returning the forward and
    /// inverse patch lists describing the observed mutations.
    pub fn produce_with_patches<F>(
        &self,
        base: Value,
        recipe: F,
    ) -> ChiselResult<(Value, Vec<Patch>, Vec<Patch>)>
    where
        F: FnOnce(&Draft) -> RecipeResult,
    {
        let (value, patches) = self.run(base, recipe, true)?;
        let (forward, inverse) = patches.unwrap_or_default();
        Ok((value, forward, inverse))
    }

    #[allow(clippy::type_complexity)]
    fn run<F>(
        &self,
        base: Value,
        recipe: F,
        with_patches: bool,
    ) -> ChiselResult<(Value, Option<(Vec<Patch>, Vec<Patch>)>)>
    where
        F: FnOnce(&Draft) -> RecipeResult,
    {
        if base.is_draft() {
            return Err(ChiselError::bad_argument(
                "produce over a live draft is not supported; mutate the draft directly",
            ));
        }
        if base.is_draftable() {
            let scope = Scope::enter(self.auto_freeze(), self.strict_copy(), with_patches);
            let root = match Draft::attach(base, None, &scope) {
                Ok(root) => root,
                Err(err) => {
                    scope.revoke();
                    return Err(err);
                }
            };
            let result = match recipe(&root) {
                Ok(result) => result,
                Err(err) => {
                    scope.revoke();
                    return Err(err);
                }
            };
            let value = finish_run(&scope, result)?;
            let patches = scope.take_patches();
            Ok((value, patches))
        } else if matches!(base, Value::Record(_) | Value::Opaque(_)) {
            Err(ChiselError::not_draftable(base.type_name()))
        } else {
            self.run_leaf(base, recipe, with_patches)
        }
    }

    /// Non-container bases run the recipe against an inert stand-in; the
    /// returned value replaces the base wholesale.
    #[allow(clippy::type_complexity)]
    fn run_leaf<F>(
        &self,
        base: Value,
        recipe: F,
        with_patches: bool,
    ) -> ChiselResult<(Value, Option<(Vec<Patch>, Vec<Patch>)>)>
    where
        F: FnOnce(&Draft) -> RecipeResult,
    {
        let scope = Scope::detached(self.auto_freeze(), self.strict_copy());
        let leaf = Draft::attach_leaf(base.clone(), &scope);
        let value = match recipe(&leaf)? {
            None => base.clone(),
            Some(v) if v.is_nothing() => Value::Null,
            Some(v) => v,
        };
        if self.auto_freeze() {
            freeze_value(&value, true);
        }
        let patches = with_patches.then(|| {
            (
                vec![Patch::replace(Path::root(), value.clone())],
                vec![Patch::replace(Path::root(), base)],
            )
        });
        Ok((value, patches))
    }

    /// Create a draft whose lifetime is not bounded by a recipe call.
    ///
    /// The draft stays live until [`Engine::finish_draft`]; until then it
    /// keeps its base and scope alive and belongs to no active run.
    pub fn create_draft(&self, base: Value) -> ChiselResult<Draft> {
        if base.is_draft() {
            return Err(ChiselError::bad_argument(
                "create_draft over a live draft is not supported",
            ));
        }
        if !base.is_draftable() {
            return Err(ChiselError::not_draftable(base.type_name()));
        }
        let scope = Scope::enter(self.auto_freeze(), self.strict_copy(), false);
        let root = match Draft::attach(base, None, &scope) {
            Ok(root) => root,
            Err(err) => {
                scope.revoke();
                return Err(err);
            }
        };
        root.lock().manual = true;
        scope.leave();
        Ok(root)
    }

    /// Finalize a manual draft into its value, revoking it.
    pub fn finish_draft(&self, draft: &Draft) -> ChiselResult<Value> {
        self.finish_manual(draft, false).map(|(value, _)| value)
    }

    /// Finalize a manual draft, returning the value plus patch lists.
    pub fn finish_draft_with_patches(
        &self,
        draft: &Draft,
    ) -> ChiselResult<(Value, Vec<Patch>, Vec<Patch>)> {
        let (value, patches) = self.finish_manual(draft, true)?;
        let (forward, inverse) = patches.unwrap_or_default();
        Ok((value, forward, inverse))
    }

    #[allow(clippy::type_complexity)]
    fn finish_manual(
        &self,
        draft: &Draft,
        with_patches: bool,
    ) -> ChiselResult<(Value, Option<(Vec<Patch>, Vec<Patch>)>)> {
        let scope = {
            let st = draft.lock();
            Draft::check_live(&st)?;
            if !st.manual {
                return Err(ChiselError::bad_argument(
                    "finish_draft requires a draft created by create_draft",
                ));
            }
            st.scope.clone()
        };
        if with_patches {
            scope.enable_patches();
        }
        let value = finish_run(&scope, None)?;
        let patches = scope.take_patches();
        Ok((value, patches))
    }

    /// Replay a patch list against `base`, returning the new value.
    pub fn apply_patches(&self, base: &Value, patches: &[Patch]) -> ChiselResult<Value> {
        apply_patch_list(self, base, patches)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

fn default_engine() -> &'static Engine {
    static DEFAULT: OnceLock<Engine> = OnceLock::new();
    DEFAULT.get_or_init(Engine::new)
}

/// Run a recipe against the process-default engine. See [`Engine::produce`].
pub fn produce<F>(base: Value, recipe: F) -> ChiselResult<Value>
where
    F: FnOnce(&Draft) -> RecipeResult,
{
    default_engine().produce(base, recipe)
}

/// See [`Engine::produce_with_patches`].
pub fn produce_with_patches<F>(
    base: Value,
    recipe: F,
) -> ChiselResult<(Value, Vec<Patch>, Vec<Patch>)>
where
    F: FnOnce(&Draft) -> RecipeResult,
{
    default_engine().produce_with_patches(base, recipe)
}

/// See [`Engine::create_draft`].
pub fn create_draft(base: Value) -> ChiselResult<Draft> {
    default_engine().create_draft(base)
}

/// See [`Engine::finish_draft`].
pub fn finish_draft(draft: &Draft) -> ChiselResult<Value> {
    default_engine().finish_draft(draft)
}

/// See [`Engine::finish_draft_with_patches`].
pub fn finish_draft_with_patches(draft: &Draft) -> ChiselResult<(Value, Vec<Patch>, Vec<Patch>)> {
    default_engine().finish_draft_with_patches(draft)
}

/// See [`Engine::apply_patches`].
pub fn apply_patches(base: &Value, patches: &[Patch]) -> ChiselResult<Value> {
    default_engine().apply_patches(base, patches)
}

/// Configure auto-freeze on the process-default engine.
pub fn set_auto_freeze(on: bool) {
    default_engine().set_auto_freeze(on);
}

/// Configure strict shallow copies on the process-default engine.
pub fn set_strict_copy(mode: StrictCopyMode) {
    default_engine().set_strict_copy(mode);
}

/// Whether a value is a live draft.
pub fn is_draft(value: &Value) -> bool {
    value.is_draft()
}

/// Whether the engine may draft a value.
pub fn is_draftable(value: &Value) -> bool {
    !value.is_draft() && value.is_draftable()
}

/// The base value a draft stands in for, or `None` for non-drafts.
pub fn original(value: &Value) -> Option<Value> {
    value.as_draft().map(|d| d.base())
}

//! Structural-sharing, copy-on-write immutable updates with bidirectional
//! patch logs.
//!
//! A caller hands [`produce`] a root [`Value`] and a *recipe* that mutates a
//! transparently-interposed [`Draft`]; the library returns a new value that
//! shares every unmodified node with the root. The original is never mutated.
//!
//! # Core Concepts
//!
//! - **Value**: the container model: records, sequences, keyed maps, unique
//!   sets, plus opaque pass-through scalars and payloads
//! - **Draft**: a mutable stand-in that lazily materializes one-level copies
//!   and tracks per-key writes
//! - **Scope**: the per-run context owning every draft a recipe creates;
//!   drafts that escape a finished run are permanently revoked
//! - **Patch**: a discrete `add`/`replace`/`remove` edit; every run can emit
//!   a forward and an inverse list, replayable with [`apply_patches`]
//! - **Engine**: per-instance configuration (auto-freeze, strict copies);
//!   crate-level functions use a process-wide default engine
//!
//! # Quick Start
//!
//! ```
//! use chisel_state::{produce, value, Value};
//!
//! let base = value!({"a": {"x": 1}, "b": {"y": 2}});
//!
//! let next = produce(base.clone(), |draft| {
//!     draft.get_draft("a")?.set("x", 9)?;
//!     Ok(None)
//! })
//! .unwrap();
//!
//! assert_eq!(next.get_key("a").unwrap().get_key("x"), Some(Value::Int(9)));
//! // The untouched branch is shared with the base, not copied.
//! assert!(Value::same(
//!     &next.get_key("b").unwrap(),
//!     &base.get_key("b").unwrap()
//! ));
//! assert_eq!(base.get_key("a").unwrap().get_key("x"), Some(Value::Int(1)));
//! ```
//!
//! # Patches
//!
//! ```
//! use chisel_state::{apply_patches, produce_with_patches, value, Engine};
//!
//! let engine = Engine::new();
//! engine.set_auto_freeze(false);
//!
//! let base = value!({"count": 1});
//! let (next, forward, inverse) = engine
//!     .produce_with_patches(base.clone(), |draft| {
//!         draft.set("count", 2)?;
//!         Ok(None)
//!     })
//!     .unwrap();
//!
//! assert_eq!(engine.apply_patches(&base, &forward).unwrap(), next);
//! assert_eq!(engine.apply_patches(&next, &inverse).unwrap(), base);
//! ```

mod apply;
mod class;
mod collections;
mod copy;
mod draft;
mod error;
mod finalize;
mod freeze;
mod generate;
mod macros;
mod patch;
mod path;
mod runtime;
mod scope;
mod sentinel;
mod snapshot;
mod value;
mod wire;

pub use class::{Accessor, ClassBuilder, ClassTag};
pub use copy::StrictCopyMode;
pub use draft::Draft;
pub use error::{ChiselError, ChiselResult};
pub use freeze::freeze;
pub use patch::Patch;
pub use path::{Path, Seg};
pub use runtime::{
    apply_patches, create_draft, finish_draft, finish_draft_with_patches, is_draft, is_draftable,
    original, produce, produce_with_patches, set_auto_freeze, set_strict_copy, Engine, RecipeResult,
};
pub use sentinel::{draftable_marker, nothing, Sentinel, DRAFTABLE_KEY};
pub use snapshot::snapshot;
pub use value::{Kind, OpaqueRef, OpaqueValue, Prop, Value};

#[doc(hidden)]
pub use macros::RecordBuilder;

// Purpose: Define crate-level module surface for the unit-overlay composition engine.
// Inputs/Outputs: Re-exports internal modules and the primary entry-point types.
// Invariants: Public module boundaries should remain stable for internal callers.
// Gotchas: Keep module wiring consistent with the engine/mount pipeline layering.

pub mod engine;
pub mod error;
pub mod eval;
pub mod frontend;
pub mod mount;

pub use engine::Engine;
pub use error::{ComposeError, EvalError};
pub use eval::value::{Namespace, Value};
pub use mount::locate::{CodeUnit, Locator, UnitKind};
pub use mount::registry::{MergedUnit, MountSpec, Registry};

//! The compile/execute contract implemented by every rendering engine.
//!
//! An [`Engine`] translates template source into a [`CompiledUnit`] exactly
//! once; the unit's [`Program`] is then evaluated any number of times against
//! varying [`EvalContext`]s. Engines never cache or pool anything across
//! templates: [`Template`](crate::Template) owns the compiled unit and the
//! compile-once guarantee.

use std::fmt;

use serde_json::Value;

use crate::error::Error;
use crate::line_map::LineMap;
use crate::template::RenderOptions;

/// A rendering engine that can compile template source into an executable
/// program.
///
/// Implementations are thin bindings over a concrete backend (a substitution
/// interpreter, a Jinja environment, a CSV writer). They are stateless with
/// respect to individual templates; per-template state lives in the
/// [`CompiledUnit`] they return.
pub trait Engine: Send + Sync {
    /// Stable identifying name, e.g. `"simple"` or `"minijinja"`.
    fn name(&self) -> &str;

    /// Compiles template source into an executable unit.
    ///
    /// Called at most once per [`Template`](crate::Template) instance, on
    /// first render. Engine-specific options arrive verbatim through
    /// `options`; the engine must not mutate them (it cannot: they are
    /// borrowed immutably).
    ///
    /// The returned [`LineMap`] must cover every line of the generated
    /// program so evaluation failures can be reported at the correct source
    /// position.
    fn compile(&self, source: &str, options: &RenderOptions) -> Result<CompiledUnit, Error>;
}

impl fmt::Debug for dyn Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("name", &self.name()).finish()
    }
}

/// The product of one compilation: an executable program plus the line map
/// correlating its generated lines back to template source lines.
pub struct CompiledUnit {
    pub program: Box<dyn Program>,
    pub line_map: LineMap,
}

impl CompiledUnit {
    pub fn new(program: Box<dyn Program>, line_map: LineMap) -> Self {
        Self { program, line_map }
    }
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("line_map", &self.line_map)
            .finish_non_exhaustive()
    }
}

/// Everything one evaluation may observe.
///
/// Built fresh by [`Template::render_with`](crate::Template::render_with) for
/// every render call; evaluations never see state from prior evaluations
/// except through the caller-reused scope and locals baked into `data`.
pub struct EvalContext<'a> {
    /// Merged scope fields and locals (locals win on collision), plus the
    /// output-accumulator slot when `outvar` is configured.
    pub data: Value,

    /// Callable invoked when the template body requests yield semantics.
    pub block: Option<&'a dyn Fn() -> String>,

    /// Name of the configured output-accumulator slot, if any. Engines that
    /// expose their working buffer by name use this; engines with a purely
    /// internal accumulator may ignore it.
    pub outvar: Option<&'a str>,
}

/// An executable template body.
///
/// `evaluate` must allocate a fresh output accumulator per call and return the
/// fully materialized output as a single string. Errors raised by the template
/// body propagate unchanged; when the failing generated line is known, it is
/// recorded on the error for the owning template to rewrite through the line
/// map.
pub trait Program {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<String, Error>;
}

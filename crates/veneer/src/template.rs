//! Compile-once, render-many template instances.
//!
//! A [`Template`] owns one unit of template source, the engine that will
//! compile it, and the compiled form once it exists. Construction is cheap and
//! performs no work: source may be supplied eagerly or through a deferred
//! provider that runs at most once, no later than the first render.
//!
//! The first call to [`Template::render_with`] compiles; every subsequent
//! call reuses the cached [`CompiledUnit`]. Evaluations are independent: each
//! render builds a fresh data object and output accumulator, so no state
//! leaks between calls except through caller-reused scope and locals.
//!
//! # Line offsets
//!
//! A template's source may be embedded at an arbitrary line of a larger file.
//! [`TemplateBuilder::start_line`] records where: template source line 1 maps
//! to `start_line`, and evaluation errors are reported at
//! `path:start_line + source_line - 1` after translation through the engine's
//! line map.
//!
//! # Output-variable protocol
//!
//! When the `outvar` option names a field that also exists on the caller's
//! scope, evaluated code sees the working accumulator under that name, but
//! the caller's value survives the render untouched: the engine only ever
//! works on an internal serialized copy of the scope, so restoration is
//! inherent rather than patched up after the fact.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::engine::{CompiledUnit, Engine, EvalContext};
use crate::error::Error;

use std::sync::Arc;

type SourceProvider = Box<dyn FnOnce() -> Result<String, std::io::Error>>;

enum Source {
    Inline(String),
    Deferred(Option<SourceProvider>),
}

/// Generic template configuration: the recognized `outvar` slot name plus
/// engine-specific options passed through verbatim.
///
/// Construction never mutates anything the caller supplied;
/// [`RenderOptions::from_map`] clones out of the caller's mapping and leaves
/// it untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    outvar: Option<String>,
    engine: HashMap<String, Value>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a caller-owned mapping. The `outvar` key, when a
    /// string, is recognized generically; every other entry is kept verbatim
    /// for the engine.
    pub fn from_map(options: &HashMap<String, Value>) -> Self {
        let mut built = Self::new();
        for (key, value) in options {
            match (key.as_str(), value) {
                ("outvar", Value::String(name)) => built.outvar = Some(name.clone()),
                _ => {
                    built.engine.insert(key.clone(), value.clone());
                }
            }
        }
        built
    }

    /// Names the variable used as the output accumulator, for engines that
    /// expose one.
    pub fn outvar(mut self, name: impl Into<String>) -> Self {
        self.outvar = Some(name.into());
        self
    }

    /// Sets an engine-specific option, passed through verbatim.
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.engine.insert(key.into(), value);
        self
    }

    pub fn outvar_name(&self) -> Option<&str> {
        self.outvar.as_deref()
    }

    /// Engine-specific option by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.engine.get(key)
    }
}

/// One render call's transient inputs: scope object, local variables, and an
/// optional block for yield semantics. Discarded when the call returns.
#[derive(Default)]
pub struct RenderContext<'a> {
    scope: Option<Value>,
    locals: HashMap<String, Value>,
    block: Option<&'a dyn Fn() -> String>,
}

impl<'a> RenderContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scope object. It must serialize to an object (or null, which
    /// is treated as an empty scope); its fields are addressable by name from
    /// the template body.
    pub fn scope<T: Serialize>(mut self, scope: &T) -> Result<Self, Error> {
        let value =
            serde_json::to_value(scope).map_err(|err| Error::Scope(err.to_string()))?;
        match value {
            Value::Object(_) | Value::Null => {
                self.scope = Some(value);
                Ok(self)
            }
            other => Err(Error::Scope(format!(
                "scope must serialize to an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Adds one local variable.
    pub fn local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.insert(name.into(), value);
        self
    }

    /// Merges a mapping of local variables.
    pub fn locals(mut self, locals: HashMap<String, Value>) -> Self {
        self.locals.extend(locals);
        self
    }

    /// Supplies the block invoked when the template body requests yield
    /// semantics.
    pub fn block(mut self, block: &'a dyn Fn() -> String) -> Self {
        self.block = Some(block);
        self
    }
}

impl fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("scope", &self.scope)
            .field("locals", &self.locals)
            .field("block", &self.block.map(|_| "<block>"))
            .finish()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Builder for [`Template`]. Obtained from [`Template::builder`].
pub struct TemplateBuilder {
    engine: Arc<dyn Engine>,
    path: Option<String>,
    start_line: usize,
    options: RenderOptions,
    source: Option<Source>,
}

impl TemplateBuilder {
    fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            path: None,
            start_line: 1,
            options: RenderOptions::new(),
            source: None,
        }
    }

    /// Source path used in reported error locations.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Line of the outer file at which this template's source begins.
    /// Defaults to 1; values below 1 are clamped to 1.
    pub fn start_line(mut self, line: usize) -> Self {
        self.start_line = line.max(1);
        self
    }

    pub fn options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Supplies source text eagerly.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(Source::Inline(source.into()));
        self
    }

    /// Supplies source lazily. The provider is invoked at most once, no later
    /// than the first render.
    pub fn source_with(
        mut self,
        provider: impl FnOnce() -> Result<String, std::io::Error> + 'static,
    ) -> Self {
        self.source = Some(Source::Deferred(Some(Box::new(provider))));
        self
    }

    pub fn build(self) -> Result<Template, Error> {
        let source = self.source.ok_or(Error::MissingSource)?;
        Ok(Template {
            engine: self.engine,
            path: self.path,
            start_line: self.start_line,
            options: self.options,
            source,
            compiled: None,
        })
    }
}

/// A single template unit: compiled exactly once, evaluated many times.
///
/// Not thread-safe; first-render compilation and rendering in general take
/// `&mut self` and must be serialized by the caller if shared.
pub struct Template {
    engine: Arc<dyn Engine>,
    path: Option<String>,
    start_line: usize,
    options: RenderOptions,
    source: Source,
    compiled: Option<CompiledUnit>,
}

impl Template {
    pub fn builder(engine: Arc<dyn Engine>) -> TemplateBuilder {
        TemplateBuilder::new(engine)
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Name of the engine backing this template.
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// True once the first render has compiled the source.
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Source text, if already materialized. `None` until a deferred
    /// provider has run.
    pub fn source(&self) -> Option<&str> {
        match &self.source {
            Source::Inline(source) => Some(source),
            Source::Deferred(_) => None,
        }
    }

    /// Renders with a scope object and nothing else.
    pub fn render<T: Serialize>(&mut self, scope: &T) -> Result<String, Error> {
        let ctx = RenderContext::new().scope(scope)?;
        self.render_with(ctx)
    }

    /// Renders with full control over scope, locals, and block.
    ///
    /// The first call compiles the source; subsequent calls reuse the
    /// compiled unit. Each call evaluates independently with a fresh output
    /// accumulator. Evaluation errors propagate with their location rewritten
    /// to the original source position.
    pub fn render_with(&mut self, ctx: RenderContext<'_>) -> Result<String, Error> {
        self.ensure_compiled()?;
        let unit = self.compiled.as_ref().ok_or(Error::MissingSource)?;

        let data = self.eval_data(ctx.scope, ctx.locals);
        let eval = EvalContext {
            data,
            block: ctx.block,
            outvar: self.options.outvar_name(),
        };

        unit.program
            .evaluate(&eval)
            .map_err(|err| self.relocate(err, &unit.line_map))
    }

    fn ensure_compiled(&mut self) -> Result<(), Error> {
        if self.compiled.is_some() {
            return Ok(());
        }
        let source = match std::mem::replace(&mut self.source, Source::Deferred(None)) {
            Source::Inline(source) => source,
            Source::Deferred(Some(provider)) => provider()?,
            Source::Deferred(None) => return Err(Error::MissingSource),
        };
        let unit = self.engine.compile(&source, &self.options)?;
        self.source = Source::Inline(source);
        self.compiled = Some(unit);
        Ok(())
    }

    /// Builds the per-call evaluation data: scope fields overlaid with locals
    /// (locals win), plus the accumulator slot when `outvar` is configured.
    fn eval_data(&self, scope: Option<Value>, locals: HashMap<String, Value>) -> Value {
        let mut data = match scope {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for (name, value) in locals {
            data.insert(name, value);
        }
        if let Some(outvar) = self.options.outvar_name() {
            // The working accumulator shadows any same-named scope field for
            // the duration of the evaluation. The caller's own object is
            // never touched.
            data.insert(outvar.to_string(), Value::String(String::new()));
        }
        Value::Object(data)
    }

    /// Rewrites an evaluation error's generated-code line to the original
    /// source position: translate through the line map, then apply the
    /// configured start-line offset.
    fn relocate(&self, err: Error, line_map: &crate::line_map::LineMap) -> Error {
        match err.template_line() {
            Some(generated) => {
                let source_line = line_map.source_line(generated).unwrap_or(generated);
                err.relocated(self.start_line + source_line - 1, self.path.as_deref())
            }
            None => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Program;
    use crate::line_map::LineMap;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine whose program echoes the `msg` field of the evaluation data,
    /// counting compilations.
    struct EchoEngine {
        compiles: Arc<AtomicUsize>,
    }

    struct EchoProgram;

    impl Program for EchoProgram {
        fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<String, Error> {
            match ctx.data.get("msg") {
                Some(Value::String(msg)) => Ok(msg.clone()),
                _ => Err(Error::UndefinedVariable {
                    name: "msg".to_string(),
                    line: Some(1),
                    path: None,
                }),
            }
        }
    }

    impl Engine for EchoEngine {
        fn name(&self) -> &str {
            "echo"
        }

        fn compile(&self, _source: &str, _options: &RenderOptions) -> Result<CompiledUnit, Error> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Ok(CompiledUnit::new(Box::new(EchoProgram), LineMap::identity(1)))
        }
    }

    /// Engine whose program always fails on a fixed generated line; generated
    /// line 2 corresponds to source line 3.
    struct FailingEngine;

    impl Engine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        fn compile(&self, _source: &str, _options: &RenderOptions) -> Result<CompiledUnit, Error> {
            struct Fail;
            impl Program for Fail {
                fn evaluate(&self, _ctx: &EvalContext<'_>) -> Result<String, Error> {
                    Err(Error::Evaluation {
                        message: "boom".to_string(),
                        line: Some(2),
                        path: None,
                    })
                }
            }
            let mut map = LineMap::new();
            map.push(1);
            map.push(3);
            Ok(CompiledUnit::new(Box::new(Fail), map))
        }
    }

    fn echo_engine() -> (Arc<EchoEngine>, Arc<AtomicUsize>) {
        let compiles = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(EchoEngine {
                compiles: compiles.clone(),
            }),
            compiles,
        )
    }

    #[test]
    fn test_compiles_once_across_renders() {
        let (engine, compiles) = echo_engine();
        let mut template = Template::builder(engine)
            .source("ignored")
            .build()
            .unwrap();

        let scope = json!({"msg": "hi"});
        for _ in 0..3 {
            assert_eq!(template.render(&scope).unwrap(), "hi");
        }
        assert_eq!(compiles.load(Ordering::SeqCst), 1);
        assert!(template.is_compiled());
    }

    #[test]
    fn test_render_before_compile_flag() {
        let (engine, _) = echo_engine();
        let template = Template::builder(engine)
            .source("ignored")
            .build()
            .unwrap();
        assert!(!template.is_compiled());
    }

    #[test]
    fn test_deferred_source_runs_once() {
        let (engine, _) = echo_engine();
        let runs = Rc::new(Cell::new(0));
        let runs_in_provider = runs.clone();
        let mut template = Template::builder(engine)
            .source_with(move || {
                runs_in_provider.set(runs_in_provider.get() + 1);
                Ok("deferred".to_string())
            })
            .build()
            .unwrap();

        assert_eq!(template.source(), None);
        template.render(&json!({"msg": "a"})).unwrap();
        template.render(&json!({"msg": "b"})).unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(template.source(), Some("deferred"));
    }

    #[test]
    fn test_deferred_source_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "ignored").unwrap();
        let path = file.path().to_path_buf();

        let (engine, _) = echo_engine();
        let mut template = Template::builder(engine)
            .path(path.display().to_string())
            .source_with(move || std::fs::read_to_string(&path))
            .build()
            .unwrap();

        assert_eq!(template.render(&json!({"msg": "hi"})).unwrap(), "hi");
        assert_eq!(template.source(), Some("ignored"));
    }

    #[test]
    fn test_deferred_source_failure_surfaces_as_io() {
        let (engine, _) = echo_engine();
        let mut template = Template::builder(engine)
            .source_with(|| Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")))
            .build()
            .unwrap();

        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_build_without_source_fails() {
        let (engine, _) = echo_engine();
        assert!(matches!(
            Template::builder(engine).build(),
            Err(Error::MissingSource)
        ));
    }

    #[test]
    fn test_locals_overlay_scope() {
        let (engine, _) = echo_engine();
        let mut template = Template::builder(engine)
            .source("ignored")
            .build()
            .unwrap();

        let ctx = RenderContext::new()
            .scope(&json!({"msg": "from scope"}))
            .unwrap()
            .local("msg", json!("from locals"));
        assert_eq!(template.render_with(ctx).unwrap(), "from locals");
    }

    #[test]
    fn test_missing_name_is_a_resolution_error() {
        let (engine, _) = echo_engine();
        let mut template = Template::builder(engine)
            .source("ignored")
            .build()
            .unwrap();

        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { .. }));
    }

    #[test]
    fn test_render_context_is_debuggable() {
        let block = || String::new();
        let ctx = RenderContext::new()
            .scope(&json!({"n": 1}))
            .unwrap()
            .local("x", json!(2))
            .block(&block);
        let rendered = format!("{:?}", ctx);
        assert!(rendered.starts_with("RenderContext"), "got {rendered}");
        assert!(rendered.contains("<block>"));
    }

    #[test]
    fn test_non_object_scope_rejected() {
        let err = RenderContext::new().scope(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, Error::Scope(_)));
    }

    #[test]
    fn test_null_scope_is_empty_scope() {
        let ctx = RenderContext::new().scope(&Value::Null).unwrap();
        let (engine, _) = echo_engine();
        let mut template = Template::builder(engine)
            .source("ignored")
            .build()
            .unwrap();
        let err = template.render_with(ctx).unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { .. }));
    }

    #[test]
    fn test_error_location_rewritten_through_line_map_and_offset() {
        // Generated line 2 maps to source line 3; source starts at line 10 of
        // the outer file, so the failure reports 10 + 3 - 1 = 12.
        let mut template = Template::builder(Arc::new(FailingEngine))
            .path("views/report.mt")
            .start_line(10)
            .source("line1\nline2\nline3")
            .build()
            .unwrap();

        let err = template.render(&json!({})).unwrap_err();
        assert_eq!(err.template_line(), Some(12));
        assert_eq!(err.source_path(), Some("views/report.mt"));
        assert_eq!(err.to_string(), "views/report.mt:12: boom");
    }

    #[test]
    fn test_default_start_line_keeps_source_lines() {
        let mut template = Template::builder(Arc::new(FailingEngine))
            .source("x")
            .build()
            .unwrap();
        let err = template.render(&json!({})).unwrap_err();
        assert_eq!(err.template_line(), Some(3));
    }

    #[test]
    fn test_start_line_clamped_to_one() {
        let (engine, _) = echo_engine();
        let template = Template::builder(engine)
            .start_line(0)
            .source("ignored")
            .build()
            .unwrap();
        assert_eq!(template.start_line(), 1);
    }

    #[test]
    fn test_options_from_map_leaves_caller_map_unchanged() {
        let mut caller = HashMap::new();
        caller.insert("outvar".to_string(), json!("_buf"));
        caller.insert("trim".to_string(), json!(true));
        let snapshot = caller.clone();

        let options = RenderOptions::from_map(&caller);
        assert_eq!(options.outvar_name(), Some("_buf"));
        assert_eq!(options.get("trim"), Some(&json!(true)));
        assert_eq!(caller, snapshot);
    }

    #[test]
    fn test_outvar_slot_shadows_scope_field_in_eval_data() {
        struct Capture;
        impl Engine for Capture {
            fn name(&self) -> &str {
                "capture"
            }
            fn compile(
                &self,
                _source: &str,
                _options: &RenderOptions,
            ) -> Result<CompiledUnit, Error> {
                struct Prog;
                impl Program for Prog {
                    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<String, Error> {
                        // The accumulator slot must start empty even when the
                        // scope carried a value under the same name.
                        match ctx.data.get("_buf") {
                            Some(Value::String(s)) if s.is_empty() => Ok("ok".to_string()),
                            other => Err(Error::Evaluation {
                                message: format!("unexpected accumulator: {:?}", other),
                                line: None,
                                path: None,
                            }),
                        }
                    }
                }
                Ok(CompiledUnit::new(Box::new(Prog), LineMap::identity(1)))
            }
        }

        let scope = json!({"_buf": "precious"});
        let mut template = Template::builder(Arc::new(Capture))
            .options(RenderOptions::new().outvar("_buf"))
            .source("ignored")
            .build()
            .unwrap();

        assert_eq!(template.render(&scope).unwrap(), "ok");
        // The caller's scope still holds its original value.
        assert_eq!(scope["_buf"], json!("precious"));
    }

    #[test]
    fn test_block_reaches_program() {
        struct Yielder;
        impl Engine for Yielder {
            fn name(&self) -> &str {
                "yielder"
            }
            fn compile(
                &self,
                _source: &str,
                _options: &RenderOptions,
            ) -> Result<CompiledUnit, Error> {
                struct Prog;
                impl Program for Prog {
                    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<String, Error> {
                        match ctx.block {
                            Some(block) => Ok(block()),
                            None => Err(Error::Evaluation {
                                message: "no block".to_string(),
                                line: Some(1),
                                path: None,
                            }),
                        }
                    }
                }
                Ok(CompiledUnit::new(Box::new(Prog), LineMap::identity(1)))
            }
        }

        let mut template = Template::builder(Arc::new(Yielder))
            .source("ignored")
            .build()
            .unwrap();

        let block = || "from block".to_string();
        let ctx = RenderContext::new().block(&block);
        assert_eq!(template.render_with(ctx).unwrap(), "from block");

        let err = template.render_with(RenderContext::new()).unwrap_err();
        assert!(matches!(err, Error::Evaluation { .. }));
    }

    #[test]
    fn test_compile_error_is_not_relocated() {
        struct BadCompile;
        impl Engine for BadCompile {
            fn name(&self) -> &str {
                "bad"
            }
            fn compile(
                &self,
                _source: &str,
                _options: &RenderOptions,
            ) -> Result<CompiledUnit, Error> {
                Err(Error::Compile {
                    message: "unexpected token".to_string(),
                    line: Some(2),
                    path: None,
                })
            }
        }

        let mut template = Template::builder(Arc::new(BadCompile))
            .start_line(50)
            .source("bad")
            .build()
            .unwrap();
        let err = template.render(&json!({})).unwrap_err();
        // Compile failures surface immediately, without line-map rewriting.
        assert_eq!(err.template_line(), Some(2));
    }
}

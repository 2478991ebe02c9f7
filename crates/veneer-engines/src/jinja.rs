//! MiniJinja-backed engine.
//!
//! Full Jinja2-compatible functionality: loops, conditionals, filters,
//! macros. Each compiled unit owns its own `minijinja::Environment` so
//! templates never observe one another. Undefined behavior is strict:
//! referencing a name that neither scope nor locals supplied raises an
//! evaluation error instead of rendering empty.

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde_json::Value;

use veneer::{CompiledUnit, Engine, Error, EvalContext, LineMap, Program, RenderOptions};

/// Name the template source is registered under inside its private
/// environment.
const TEMPLATE_NAME: &str = "template";

/// Jinja2-compatible template engine backed by MiniJinja.
#[derive(Debug, Default)]
pub struct MiniJinjaEngine;

impl MiniJinjaEngine {
    pub fn new() -> Self {
        Self
    }
}

struct MiniJinjaProgram {
    env: Environment<'static>,
    /// Whether the template body references `yield`, detected at compile
    /// time. The block is invoked only when it does.
    wants_yield: bool,
}

impl Engine for MiniJinjaEngine {
    fn name(&self) -> &str {
        "minijinja"
    }

    fn compile(&self, source: &str, _options: &RenderOptions) -> Result<CompiledUnit, Error> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template_owned(TEMPLATE_NAME.to_string(), source.to_string())
            .map_err(compile_error)?;

        let wants_yield = env
            .get_template(TEMPLATE_NAME)
            .map_err(compile_error)?
            .undeclared_variables(true)
            .contains("yield");

        // MiniJinja keeps source positions itself, so generated lines are
        // template source lines.
        let line_map = LineMap::identity(source.lines().count().max(1));
        Ok(CompiledUnit::new(
            Box::new(MiniJinjaProgram { env, wants_yield }),
            line_map,
        ))
    }
}

impl Program for MiniJinjaProgram {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<String, Error> {
        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(evaluation_error)?;

        let mut data = ctx.data.clone();
        if self.wants_yield {
            if let (Some(block), Value::Object(map)) = (ctx.block, &mut data) {
                map.insert("yield".to_string(), Value::String(block()));
            }
        }

        template
            .render(minijinja::Value::from_serialize(&data))
            .map_err(evaluation_error)
    }
}

fn compile_error(err: minijinja::Error) -> Error {
    Error::Compile {
        message: err.to_string(),
        line: err.line(),
        path: None,
    }
}

fn evaluation_error(err: minijinja::Error) -> Error {
    let line = err.line();
    match err.kind() {
        ErrorKind::UndefinedError => Error::UndefinedVariable {
            name: err.to_string(),
            line,
            path: None,
        },
        _ => Error::Evaluation {
            message: err.to_string(),
            line,
            path: None,
        },
    }
}

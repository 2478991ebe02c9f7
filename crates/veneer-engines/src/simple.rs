//! Lightweight substitution engine using `{variable}` syntax.
//!
//! [`SimpleEngine`] compiles a template into a flat segment program: literal
//! text, variable substitutions, and yield points, each substitution tagged
//! with the source line it came from so name-resolution failures report the
//! right position.
//!
//! # Syntax
//!
//! - `{name}` - variable substitution against the merged scope/locals data
//! - `{user.name}` - nested property access via dot notation
//! - `{items.0}` - array index access
//! - `{yield}` - invokes the render block
//! - `{{` and `}}` - escaped braces, rendered as `{` and `}`
//!
//! # Limitations
//!
//! No loops, conditionals, filters, or includes. For those, use the
//! MiniJinja-backed engine.

use veneer::{CompiledUnit, Engine, Error, EvalContext, LineMap, Program, RenderOptions};

use crate::util::{format_value, resolve_path};

/// One compiled unit of a `{variable}` template.
enum Segment {
    Text(String),
    Var { path: String, line: usize },
    Yield { line: usize },
}

/// A substitution-only template engine.
///
/// Unresolvable names are errors, not silent pass-throughs: templates that
/// reference a local or scope field that was not supplied fail with a
/// name-resolution error at the referencing line.
#[derive(Debug, Default)]
pub struct SimpleEngine;

impl SimpleEngine {
    pub fn new() -> Self {
        Self
    }
}

struct SimpleProgram {
    segments: Vec<Segment>,
}

impl Engine for SimpleEngine {
    fn name(&self) -> &str {
        "simple"
    }

    fn compile(&self, source: &str, _options: &RenderOptions) -> Result<CompiledUnit, Error> {
        let segments = parse(source)?;
        let line_map = LineMap::identity(source.lines().count().max(1));
        Ok(CompiledUnit::new(
            Box::new(SimpleProgram { segments }),
            line_map,
        ))
    }
}

impl Program for SimpleProgram {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<String, Error> {
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var { path, line } => match resolve_path(&ctx.data, path) {
                    Some(value) => out.push_str(&format_value(value)),
                    None => {
                        return Err(Error::UndefinedVariable {
                            name: path.clone(),
                            line: Some(*line),
                            path: None,
                        })
                    }
                },
                Segment::Yield { line } => match ctx.block {
                    Some(block) => out.push_str(&block()),
                    None => {
                        return Err(Error::Evaluation {
                            message: "template yielded but no block was supplied".to_string(),
                            line: Some(*line),
                            path: None,
                        })
                    }
                },
            }
        }

        Ok(out)
    }
}

fn parse(source: &str) -> Result<Vec<Segment>, Error> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut line = 1usize;
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '{' => {
                let var_line = line;
                let mut name = String::new();
                let mut closed = false;

                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    if inner == '\n' {
                        line += 1;
                    }
                    name.push(inner);
                }

                if !closed {
                    return Err(Error::Compile {
                        message: format!("unclosed variable substitution: {{{}", name),
                        line: Some(var_line),
                        path: None,
                    });
                }

                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::Compile {
                        message: "empty variable name".to_string(),
                        line: Some(var_line),
                        path: None,
                    });
                }

                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                if name == "yield" {
                    segments.push(Segment::Yield { line: var_line });
                } else {
                    segments.push(Segment::Var {
                        path: name.to_string(),
                        line: var_line,
                    });
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            _ => {
                if ch == '\n' {
                    line += 1;
                }
                text.push(ch);
            }
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn render(source: &str, data: Value) -> Result<String, Error> {
        let unit = SimpleEngine::new().compile(source, &RenderOptions::new())?;
        unit.program.evaluate(&EvalContext {
            data,
            block: None,
            outvar: None,
        })
    }

    #[test]
    fn test_simple_substitution() {
        let out = render("Hello, {name}!", json!({"name": "World"})).unwrap();
        assert_eq!(out, "Hello, World!");
    }

    #[test]
    fn test_multiple_variables() {
        let out = render("{first} {last}", json!({"first": "John", "last": "Doe"})).unwrap();
        assert_eq!(out, "John Doe");
    }

    #[test]
    fn test_nested_access() {
        let data = json!({"user": {"name": "Alice", "profile": {"email": "alice@example.com"}}});
        let out = render("Name: {user.name}, Email: {user.profile.email}", data).unwrap();
        assert_eq!(out, "Name: Alice, Email: alice@example.com");
    }

    #[test]
    fn test_array_index() {
        let data = json!({"items": ["first", "second", "third"]});
        let out = render("First: {items.0}, Third: {items.2}", data).unwrap();
        assert_eq!(out, "First: first, Third: third");
    }

    #[test]
    fn test_number_and_bool_values() {
        let data = json!({"count": 42, "price": 19.99, "active": true});
        let out = render("{count} {price} {active}", data).unwrap();
        assert_eq!(out, "42 19.99 true");
    }

    #[test]
    fn test_null_renders_empty() {
        let out = render("Value: {value}", json!({"value": null})).unwrap();
        assert_eq!(out, "Value: ");
    }

    #[test]
    fn test_escaped_braces() {
        let out = render("Use {{name}} for {name}", json!({"name": "test"})).unwrap();
        assert_eq!(out, "Use {name} for test");
    }

    #[test]
    fn test_whitespace_in_variable_is_trimmed() {
        let out = render("Hello { name }!", json!({"name": "World"})).unwrap();
        assert_eq!(out, "Hello World!");
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let err = render("Hello {missing}!", json!({"name": "test"})).unwrap_err();
        match err {
            Error::UndefinedVariable { name, line, .. } => {
                assert_eq!(name, "missing");
                assert_eq!(line, Some(1));
            }
            other => panic!("expected UndefinedVariable, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_variable_reports_its_line() {
        let err = render("line one\nline two\nbad: {nope}", json!({})).unwrap_err();
        assert_eq!(err.template_line(), Some(3));
    }

    #[test]
    fn test_unclosed_variable_fails_at_compile() {
        let err = SimpleEngine::new()
            .compile("ok\nHello {name", &RenderOptions::new())
            .unwrap_err();
        match err {
            Error::Compile { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("expected Compile, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_variable_name_fails_at_compile() {
        let err = SimpleEngine::new()
            .compile("Hello {}!", &RenderOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
    }

    #[test]
    fn test_yield_invokes_block() {
        let unit = SimpleEngine::new()
            .compile("before {yield} after", &RenderOptions::new())
            .unwrap();
        let block = || "middle".to_string();
        let out = unit
            .program
            .evaluate(&EvalContext {
                data: json!({}),
                block: Some(&block),
                outvar: None,
            })
            .unwrap();
        assert_eq!(out, "before middle after");
    }

    #[test]
    fn test_yield_without_block_is_an_error() {
        let err = render("{yield}", json!({})).unwrap_err();
        assert!(matches!(err, Error::Evaluation { .. }));
    }

    #[test]
    fn test_line_map_is_identity() {
        let unit = SimpleEngine::new()
            .compile("a\nb\nc", &RenderOptions::new())
            .unwrap();
        assert_eq!(unit.line_map.source_line(2), Some(2));
        assert_eq!(unit.line_map.len(), 3);
    }

    #[test]
    fn test_reevaluation_is_independent() {
        let unit = SimpleEngine::new()
            .compile("{greeting}", &RenderOptions::new())
            .unwrap();
        for greeting in ["hi", "hello", "hey"] {
            let out = unit
                .program
                .evaluate(&EvalContext {
                    data: json!({ "greeting": greeting }),
                    block: None,
                    outvar: None,
                })
                .unwrap();
            assert_eq!(out, greeting);
        }
    }

    proptest! {
        #[test]
        fn prop_brace_free_text_renders_verbatim(text in "[^{}]*") {
            let out = render(&text, json!({})).unwrap();
            prop_assert_eq!(out, text);
        }
    }
}

//! CSV rendering engine.
//!
//! A template is a single line of comma-separated column specs, each a
//! dot path into a row object (`name`, `address.city`, `tags.0`). At
//! evaluation time the scope must provide a `rows` array; the output is
//! a header row built from the specs followed by one CSV record per row,
//! with missing paths rendered as empty cells.

use serde_json::Value;

use veneer::{CompiledUnit, Engine, Error, EvalContext, LineMap, Program, RenderOptions};

use crate::util::{format_value, resolve_path};

/// Tabular engine emitting RFC 4180 CSV.
#[derive(Debug, Default)]
pub struct CsvEngine;

impl CsvEngine {
    pub fn new() -> Self {
        Self
    }
}

struct CsvProgram {
    columns: Vec<String>,
}

impl Engine for CsvEngine {
    fn name(&self) -> &str {
        "csv"
    }

    fn compile(&self, source: &str, _options: &RenderOptions) -> Result<CompiledUnit, Error> {
        let columns = parse_columns(source)?;
        let line_map = LineMap::identity(source.lines().count().max(1));
        Ok(CompiledUnit::new(Box::new(CsvProgram { columns }), line_map))
    }
}

/// Extracts the column spec line. Blank lines and `#` comment lines are
/// skipped; exactly one spec line is allowed.
fn parse_columns(source: &str) -> Result<Vec<String>, Error> {
    let mut columns: Option<(usize, Vec<String>)> = None;
    for (idx, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if columns.is_some() {
            return Err(Error::Compile {
                message: "multiple column spec lines".to_string(),
                line: Some(idx + 1),
                path: None,
            });
        }
        let specs: Vec<String> = line.split(',').map(|s| s.trim().to_string()).collect();
        if specs.iter().any(|s| s.is_empty()) {
            return Err(Error::Compile {
                message: "empty column spec".to_string(),
                line: Some(idx + 1),
                path: None,
            });
        }
        columns = Some((idx + 1, specs));
    }
    match columns {
        Some((_, specs)) => Ok(specs),
        None => Err(Error::Compile {
            message: "no column specs".to_string(),
            line: Some(1),
            path: None,
        }),
    }
}

impl Program for CsvProgram {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<String, Error> {
        let rows = match ctx.data.get("rows") {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(Error::Evaluation {
                    message: "scope must provide a `rows` array".to_string(),
                    line: None,
                    path: None,
                })
            }
        };

        let mut writer = csv::Writer::from_writer(vec![]);
        writer
            .write_record(&self.columns)
            .map_err(write_error)?;
        for row in rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|spec| {
                    resolve_path(row, spec)
                        .map(format_value)
                        .unwrap_or_default()
                })
                .collect();
            writer.write_record(&record).map_err(write_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| evaluation(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| evaluation(e.to_string()))
    }
}

fn write_error(err: csv::Error) -> Error {
    evaluation(err.to_string())
}

fn evaluation(message: String) -> Error {
    Error::Evaluation {
        message,
        line: None,
        path: None,
    }
}

//! Batteries-included engines for the `veneer` template abstraction.
//!
//! Three engines ship here:
//!
//! - [`SimpleEngine`]: `{name}` placeholder substitution with dot paths
//!   and `{yield}` block insertion.
//! - [`MiniJinjaEngine`]: full Jinja2-compatible templates via MiniJinja.
//! - [`CsvEngine`]: tabular CSV output from a column spec line.
//!
//! [`default_registry`] wires all three into an [`EngineRegistry`] with
//! lazy bindings, so an engine is only instantiated once a template with
//! a matching extension is actually resolved:
//!
//! ```rust,ignore
//! let mut registry = veneer_engines::default_registry();
//! let engine = registry.resolve("greeting.txt")?;
//! ```

use std::sync::Arc;

use veneer::{EngineRegistry, UnitTable};

mod util;

pub mod jinja;
pub mod simple;
pub mod tabular;

pub use jinja::MiniJinjaEngine;
pub use simple::SimpleEngine;
pub use tabular::CsvEngine;

/// Loader table exposing each bundled engine under its own load unit,
/// with one exported symbol per unit.
pub fn unit_table() -> UnitTable {
    let mut table = UnitTable::new();
    table
        .export(
            "veneer_engines/simple",
            "veneer_engines::Simple",
            Arc::new(SimpleEngine::new()),
        )
        .export(
            "veneer_engines/minijinja",
            "veneer_engines::MiniJinja",
            Arc::new(MiniJinjaEngine::new()),
        )
        .export(
            "veneer_engines/csv",
            "veneer_engines::Csv",
            Arc::new(CsvEngine::new()),
        );
    table
}

/// Registry with lazy bindings for every bundled engine under its
/// conventional extensions.
pub fn default_registry() -> EngineRegistry {
    let mut registry = EngineRegistry::with_loader(Box::new(unit_table()));
    registry.register_lazy("veneer_engines::Simple", "veneer_engines/simple", &["txt", "simple"]);
    registry.register_lazy(
        "veneer_engines::MiniJinja",
        "veneer_engines/minijinja",
        &["jinja", "jinja2", "j2"],
    );
    registry.register_lazy("veneer_engines::Csv", "veneer_engines/csv", &["csv"]);
    registry
}

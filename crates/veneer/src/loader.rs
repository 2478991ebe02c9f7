//! The unit-loading boundary used by lazy engine resolution.
//!
//! Lazily registered engines are identified by a qualified symbolic name plus
//! the unit that must be loaded before that name resolves. The registry never
//! touches the outside world directly; it goes through [`UnitLoader`], a
//! two-step abstract dependency: `load` a unit (which may fail recoverably
//! when the unit is absent), then `lookup` the symbol the unit was expected
//! to export.
//!
//! [`UnitTable`] is the concrete loader shipped with the crate: a capability
//! registry keyed by qualified name, where each unit declares the symbols it
//! exports and those symbols become visible to `lookup` once the unit loads.
//! Tests substitute fake loaders to exercise the fallback algorithm without
//! any real engines.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::engine::Engine;

/// Errors surfaced by [`UnitLoader::load`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// The unit does not exist. This is the sole recoverable condition: the
    /// resolver records it and falls back to the next older candidate.
    #[error("unit not found: `{0}`")]
    UnitNotFound(String),

    /// The unit exists but failed to load. Permanent; no fallback.
    #[error("failed to load unit `{unit}`: {message}")]
    Failed { unit: String, message: String },
}

impl From<LoadError> for crate::error::Error {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::UnitNotFound(unit) => crate::error::Error::UnitNotFound(unit),
            LoadError::Failed { unit, message } => {
                crate::error::Error::LoadFailed { unit, message }
            }
        }
    }
}

/// Host-environment boundary for materializing lazily registered engines.
pub trait UnitLoader {
    /// Makes a unit's exports available to [`lookup`](Self::lookup).
    /// Loading an already-loaded unit is a no-op.
    fn load(&mut self, unit: &str) -> Result<(), LoadError>;

    /// Resolves a qualified symbol to an engine, if the symbol is currently
    /// visible (exported by a loaded unit, or pre-registered).
    fn lookup(&self, symbol: &str) -> Option<Arc<dyn Engine>>;
}

/// A loader with nothing to load; every unit is absent and every symbol
/// unresolvable. The registry default.
#[derive(Debug, Default)]
pub struct EmptyLoader;

impl UnitLoader for EmptyLoader {
    fn load(&mut self, unit: &str) -> Result<(), LoadError> {
        Err(LoadError::UnitNotFound(unit.to_string()))
    }

    fn lookup(&self, _symbol: &str) -> Option<Arc<dyn Engine>> {
        None
    }
}

/// In-process capability registry backing lazy resolution.
///
/// Units are declared up front with the symbols they export; a symbol becomes
/// visible to [`lookup`](UnitLoader::lookup) only once its unit has loaded.
/// Symbols added through [`preload`](Self::preload) are visible immediately,
/// which lets the resolver skip loading entirely when the symbol is already
/// present.
#[derive(Default)]
pub struct UnitTable {
    units: HashMap<String, Vec<(String, Arc<dyn Engine>)>>,
    loaded: HashSet<String>,
    exports: HashMap<String, Arc<dyn Engine>>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `unit` exports `symbol` once loaded. A unit may export
    /// any number of symbols; declaring the unit does not load it.
    pub fn export(&mut self, unit: &str, symbol: &str, engine: Arc<dyn Engine>) -> &mut Self {
        self.units
            .entry(unit.to_string())
            .or_default()
            .push((symbol.to_string(), engine));
        self
    }

    /// Makes a symbol visible without any backing unit.
    pub fn preload(&mut self, symbol: &str, engine: Arc<dyn Engine>) -> &mut Self {
        self.exports.insert(symbol.to_string(), engine);
        self
    }

    /// True if the unit has already been loaded.
    pub fn is_loaded(&self, unit: &str) -> bool {
        self.loaded.contains(unit)
    }
}

impl UnitLoader for UnitTable {
    fn load(&mut self, unit: &str) -> Result<(), LoadError> {
        if self.loaded.contains(unit) {
            return Ok(());
        }
        let exports = match self.units.get(unit) {
            Some(exports) => exports.clone(),
            None => return Err(LoadError::UnitNotFound(unit.to_string())),
        };
        for (symbol, engine) in exports {
            self.exports.insert(symbol, engine);
        }
        self.loaded.insert(unit.to_string());
        Ok(())
    }

    fn lookup(&self, symbol: &str) -> Option<Arc<dyn Engine>> {
        self.exports.get(symbol).cloned()
    }
}

/// Whether a symbolic name can denote a qualified type path: one or more
/// `::`-separated identifier segments.
pub fn is_valid_symbol_path(symbol: &str) -> bool {
    if symbol.is_empty() {
        return false;
    }
    symbol.split("::").all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CompiledUnit, EvalContext, Program};
    use crate::error::Error;
    use crate::template::RenderOptions;

    struct Stub;

    impl Engine for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        fn compile(&self, _source: &str, _options: &RenderOptions) -> Result<CompiledUnit, Error> {
            struct Empty;
            impl Program for Empty {
                fn evaluate(&self, _ctx: &EvalContext<'_>) -> Result<String, Error> {
                    Ok(String::new())
                }
            }
            Ok(CompiledUnit::new(Box::new(Empty), crate::LineMap::new()))
        }
    }

    #[test]
    fn test_unit_table_load_then_lookup() {
        let mut table = UnitTable::new();
        table.export("engines/stub", "engines::Stub", Arc::new(Stub));

        assert!(table.lookup("engines::Stub").is_none());
        table.load("engines/stub").unwrap();
        assert!(table.lookup("engines::Stub").is_some());
        assert!(table.is_loaded("engines/stub"));
    }

    #[test]
    fn test_unit_table_missing_unit() {
        let mut table = UnitTable::new();
        let err = table.load("engines/none").unwrap_err();
        assert!(matches!(err, LoadError::UnitNotFound(_)));
    }

    #[test]
    fn test_unit_table_load_is_idempotent() {
        let mut table = UnitTable::new();
        table.export("engines/stub", "engines::Stub", Arc::new(Stub));
        table.load("engines/stub").unwrap();
        table.load("engines/stub").unwrap();
        assert!(table.lookup("engines::Stub").is_some());
    }

    #[test]
    fn test_preloaded_symbol_visible_without_load() {
        let mut table = UnitTable::new();
        table.preload("engines::Stub", Arc::new(Stub));
        assert!(table.lookup("engines::Stub").is_some());
    }

    #[test]
    fn test_empty_loader() {
        let mut loader = EmptyLoader;
        assert!(matches!(
            loader.load("anything"),
            Err(LoadError::UnitNotFound(_))
        ));
        assert!(loader.lookup("anything").is_none());
    }

    #[test]
    fn test_symbol_path_validation() {
        assert!(is_valid_symbol_path("MyTemplate"));
        assert!(is_valid_symbol_path("veneer_engines::Simple"));
        assert!(is_valid_symbol_path("a::b::C3"));
        assert!(is_valid_symbol_path("_private"));

        assert!(!is_valid_symbol_path(""));
        assert!(!is_valid_symbol_path("#foo"));
        assert!(!is_valid_symbol_path("3foo"));
        assert!(!is_valid_symbol_path("a::"));
        assert!(!is_valid_symbol_path("::a"));
        assert!(!is_valid_symbol_path("a::b c"));
    }
}

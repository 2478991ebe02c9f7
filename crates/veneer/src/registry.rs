//! Extension-to-engine registry with lazy resolution.
//!
//! The registry maps a normalized pattern (a file extension, case-insensitive)
//! to an ordered list of candidate bindings. A binding is either an engine
//! that is already resolvable or a lazy [`EngineDescriptor`] naming the unit
//! that must load before the engine exists. Within one pattern, bindings
//! registered later are tried first; older bindings are fallbacks.
//!
//! # Resolution
//!
//! [`EngineRegistry::resolve`] extracts the pattern from a file name (the
//! final dot-delimited suffix) and walks that pattern's candidates from newest
//! to oldest:
//!
//! 1. A resolved binding is returned immediately, no load attempted.
//! 2. A lazy binding with a malformed symbolic name fails permanently.
//! 3. A lazy binding whose symbol is already visible to the loader is
//!    resolved without loading the unit at all.
//! 4. Otherwise the unit is loaded. An absent unit is recoverable: the error
//!    is recorded and the walk continues older. Any other load failure, or a
//!    loaded unit missing the expected symbol, is permanent.
//! 5. On success the lazy binding is replaced in place by the resolved
//!    engine, so future lookups for this exact binding skip loading.
//!
//! If the walk exhausts every candidate through the recoverable path, the
//! recorded error is surfaced. That is the error from the newest candidate,
//! the highest-priority engine actually tried.
//!
//! # Ordering across patterns
//!
//! Every binding carries a global registration sequence number, not just a
//! per-pattern position, so callers can ask which of two engines sharing an
//! extension was registered first across the whole registry. See
//! [`EngineRegistry::registration_seq`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::Error;
use crate::loader::{is_valid_symbol_path, EmptyLoader, LoadError, UnitLoader};

/// Identifies a not-yet-loaded engine: the qualified symbolic name to resolve
/// and the unit that must be loaded to make it available. Immutable once
/// created; owned by the registry's candidate lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDescriptor {
    pub symbolic_name: String,
    pub load_unit: String,
}

impl EngineDescriptor {
    pub fn new(symbolic_name: impl Into<String>, load_unit: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            load_unit: load_unit.into(),
        }
    }
}

enum BindingKind {
    Resolved(Arc<dyn Engine>),
    Lazy(EngineDescriptor),
}

struct Binding {
    /// Global registration sequence; lower values were registered earlier
    /// across the whole registry.
    seq: u64,
    kind: BindingKind,
}

/// Extracts the lookup pattern from a file name: the substring after the last
/// `.`, or `None` when the name has no usable extension.
///
/// ```
/// use veneer::registry::pattern_for;
///
/// assert_eq!(pattern_for("hello.world.mt"), Some("mt"));
/// assert_eq!(pattern_for("README"), None);
/// assert_eq!(pattern_for("trailing."), None);
/// ```
pub fn pattern_for(name: &str) -> Option<&str> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

/// Process-wide mapping from extension patterns to rendering engines.
///
/// Not internally synchronized: both [`resolve`](Self::resolve) (which
/// memoizes loaded engines in place) and registration take `&mut self`.
/// Callers needing concurrent access must serialize.
pub struct EngineRegistry {
    patterns: HashMap<String, Vec<Binding>>,
    next_seq: u64,
    loader: Box<dyn UnitLoader>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    /// Creates a registry with no loadable units. Lazy bindings registered on
    /// such a registry can only resolve through fallback to resolved
    /// bindings.
    pub fn new() -> Self {
        Self::with_loader(Box::new(EmptyLoader))
    }

    /// Creates a registry backed by the given unit loader.
    pub fn with_loader(loader: Box<dyn UnitLoader>) -> Self {
        Self {
            patterns: HashMap::new(),
            next_seq: 0,
            loader,
        }
    }

    /// The loader supplied at construction, for host environments that need
    /// to declare additional units after the fact.
    pub fn loader_mut(&mut self) -> &mut dyn UnitLoader {
        &mut *self.loader
    }

    /// Binds an already-resolvable engine to one or more patterns.
    ///
    /// Patterns are case-folded. Later registrations for the same pattern
    /// take priority over earlier ones at resolution time.
    pub fn register(&mut self, engine: Arc<dyn Engine>, patterns: &[&str]) {
        for pattern in patterns {
            let seq = self.bump_seq();
            self.bindings_for(pattern).push(Binding {
                seq,
                kind: BindingKind::Resolved(engine.clone()),
            });
        }
    }

    /// Binds a deferred descriptor to one or more patterns without resolving
    /// or loading anything now. Later registrations for the same pattern take
    /// priority.
    pub fn register_lazy(&mut self, symbolic_name: &str, load_unit: &str, patterns: &[&str]) {
        for pattern in patterns {
            let seq = self.bump_seq();
            self.bindings_for(pattern).push(Binding {
                seq,
                kind: BindingKind::Lazy(EngineDescriptor::new(symbolic_name, load_unit)),
            });
        }
    }

    /// True if the pattern has at least one binding, resolved or lazy.
    /// Case-insensitive; true immediately after registration, before any
    /// resolution occurs.
    pub fn registered(&self, pattern: &str) -> bool {
        self.patterns
            .get(&pattern.to_ascii_lowercase())
            .is_some_and(|bindings| !bindings.is_empty())
    }

    /// Resolves a file name to a concrete engine by its extension pattern.
    ///
    /// See the module docs for the full fallback algorithm. Names without a
    /// dot-delimited suffix cannot be resolved and fail with
    /// [`Error::NotFound`].
    pub fn resolve(&mut self, name: &str) -> Result<Arc<dyn Engine>, Error> {
        let pattern =
            pattern_for(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.resolve_pattern(pattern)
    }

    /// Resolves a bare pattern (no name parsing) to a concrete engine.
    pub fn resolve_pattern(&mut self, pattern: &str) -> Result<Arc<dyn Engine>, Error> {
        let key = pattern.to_ascii_lowercase();
        // Split borrows: the walk memoizes into `patterns` while `loader`
        // performs the actual loading.
        let Self {
            patterns, loader, ..
        } = self;

        let bindings = match patterns.get_mut(&key) {
            Some(bindings) if !bindings.is_empty() => bindings,
            _ => return Err(Error::NotFound(key)),
        };

        // The first recoverable error observed walking newest to oldest, i.e.
        // the newest candidate's. Surfaced if the whole walk comes up empty.
        let mut first_missing: Option<Error> = None;

        for binding in bindings.iter_mut().rev() {
            let descriptor = match &binding.kind {
                BindingKind::Resolved(engine) => return Ok(engine.clone()),
                BindingKind::Lazy(descriptor) => descriptor,
            };

            if !is_valid_symbol_path(&descriptor.symbolic_name) {
                return Err(Error::MalformedDescriptor(descriptor.symbolic_name.clone()));
            }

            // Already-visible symbols short-circuit the load entirely.
            if let Some(engine) = loader.lookup(&descriptor.symbolic_name) {
                binding.kind = BindingKind::Resolved(engine.clone());
                return Ok(engine);
            }

            match loader.load(&descriptor.load_unit) {
                Ok(()) => match loader.lookup(&descriptor.symbolic_name) {
                    Some(engine) => {
                        binding.kind = BindingKind::Resolved(engine.clone());
                        return Ok(engine);
                    }
                    None => {
                        return Err(Error::SymbolNotFound {
                            unit: descriptor.load_unit.clone(),
                            symbol: descriptor.symbolic_name.clone(),
                        })
                    }
                },
                Err(LoadError::UnitNotFound(unit)) => {
                    if first_missing.is_none() {
                        first_missing = Some(Error::UnitNotFound(unit));
                    }
                }
                Err(err @ LoadError::Failed { .. }) => return Err(err.into()),
            }
        }

        Err(first_missing.unwrap_or(Error::NotFound(key)))
    }

    /// Global registration sequence of a binding under `pattern`, matched by
    /// the engine's name for resolved bindings or the symbolic name for lazy
    /// ones. Lower values were registered earlier across the entire registry,
    /// which is what conformance tests compare when asserting that one engine
    /// takes priority over another for a shared extension.
    pub fn registration_seq(&self, pattern: &str, name: &str) -> Option<u64> {
        self.patterns
            .get(&pattern.to_ascii_lowercase())?
            .iter()
            .find_map(|binding| {
                let matches = match &binding.kind {
                    BindingKind::Resolved(engine) => engine.name() == name,
                    BindingKind::Lazy(descriptor) => descriptor.symbolic_name == name,
                };
                matches.then_some(binding.seq)
            })
    }

    /// Registered patterns, in no particular order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .filter(|(_, bindings)| !bindings.is_empty())
            .map(|(pattern, _)| pattern.as_str())
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn bindings_for(&mut self, pattern: &str) -> &mut Vec<Binding> {
        self.patterns
            .entry(pattern.to_ascii_lowercase())
            .or_default()
    }
}

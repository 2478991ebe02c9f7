//! # Veneer - Template-Engine Abstraction Layer
//!
//! `veneer` sits between callers and concrete template engines: given a file
//! name (or a bare extension pattern), it selects an engine implementation,
//! compiles a template exactly once, and evaluates it repeatedly against
//! varying scopes, locals, and blocks.
//!
//! The crate has two halves:
//!
//! - [`EngineRegistry`]: maps file-extension patterns to candidate engines,
//!   with lazy registration that defers loading an implementation until first
//!   lookup, deterministic most-recently-registered-wins ordering, and
//!   fallback across candidates whose backing unit is absent.
//! - [`Template`]: the compile-once/render-many contract every engine
//!   satisfies, including the output-buffer protocol and source-line
//!   preservation so runtime failures report the template author's file and
//!   line.
//!
//! Concrete engines live elsewhere (the companion `veneer-engines` crate
//! provides substitution, Jinja, and CSV backends); anything implementing
//! [`Engine`] plugs in.
//!
//! ## Resolving and rendering
//!
//! ```rust,ignore
//! use veneer::{EngineRegistry, RenderContext, Template};
//! use veneer_engines::unit_table;
//!
//! let mut registry = EngineRegistry::with_loader(Box::new(unit_table()));
//! registry.register_lazy("veneer_engines::Simple", "veneer_engines/simple", &["txt"]);
//!
//! let engine = registry.resolve("greeting.txt")?;
//! let mut template = Template::builder(engine)
//!     .path("greeting.txt")
//!     .source("Hello, {name}!")
//!     .build()?;
//!
//! let out = template.render_with(
//!     RenderContext::new().local("name", "Joe".into()),
//! )?;
//! assert_eq!(out, "Hello, Joe!");
//! ```
//!
//! ## Lazy registration
//!
//! Engines register by symbolic name plus the unit that must load before the
//! name resolves. Nothing loads until a lookup needs it, and competing
//! registrations for one extension fall back newest-to-oldest when a backing
//! unit is missing:
//!
//! ```rust,ignore
//! registry.register_lazy("veneer_engines::Erubi", "veneer_engines/erubi", &["erb"]);
//! registry.register_lazy("veneer_engines::Erb", "veneer_engines/erb", &["erb"]);
//! // resolve("view.erb") tries Erb first; if its unit is absent, Erubi.
//! ```
//!
//! ## Concurrency
//!
//! Single-threaded cooperative model: registration, resolution (which
//! memoizes in place), and rendering (which compiles on first use) all take
//! `&mut self`, and nothing locks internally. Callers wanting shared access
//! wrap instances in their own synchronization.

pub mod engine;
pub mod error;
pub mod line_map;
pub mod loader;
pub mod registry;
pub mod template;

pub use engine::{CompiledUnit, Engine, EvalContext, Program};
pub use error::Error;
pub use line_map::LineMap;
pub use loader::{is_valid_symbol_path, EmptyLoader, LoadError, UnitLoader, UnitTable};
pub use registry::{pattern_for, EngineDescriptor, EngineRegistry};
pub use template::{RenderContext, RenderOptions, Template, TemplateBuilder};

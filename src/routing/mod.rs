//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup, first match in configured order)
//!     → matcher.rs (segment-aware prefix test)
//!     → rewrite.rs (anchored regex rewrite, first match wins)
//!     → target.rs (join with target base path)
//!     → Return: matched RouteRule + upstream path, or no match
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse targets and rewrite patterns
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Route selection is a plain prefix scan; regexes only rewrite
//! - Deterministic: same input always matches same route
//! - First match wins (configured order)

pub mod matcher;
pub mod rewrite;
pub mod router;
pub mod target;

pub use rewrite::{rewrite_path, RewriteRule};
pub use router::{RouteRule, RouteTable};
pub use target::{Target, TargetScheme};

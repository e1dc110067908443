//! zod contracts compiler
//!
//! Compiles an OpenAPI-shaped API description into a TypeScript module of
//! structural types, zod validators and per-route request/response tables.
//!
//! ## Features
//!
//! - **Deterministic**: identical input produces byte-identical output
//! - **Dependency Ordering**: components are declared after what they
//!   reference; cycles bind through `z.lazy`
//! - **Structural Deduplication**: SHA256 fingerprints collapse equal schemas
//!   into one declaration plus aliases
//! - **Discriminated Unions**: inferred from a shared single-literal field
//! - **Round-trip**: every generated validator describes the schema it was
//!   built from ([`Validator::introspect`])
//!
//! ## Output layout
//!
//! ```text
//! // provenance header
//! import { z } from "zod";
//! <caller imports>
//!
//! <components, dependencies first>
//! // Pre-registered validator types
//! // Common schemas
//! // Route schemas
//! export const Request = { ... } as const;
//! export const Response = { ... } as const;
//! ```

pub mod codegen;
pub mod config;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod registry;
pub mod routes;
pub mod schema;

pub use codegen::{compile, render_self_tests, CompileOptions, CompileOutput, Compiler, NamedDeclaration, Validator};
pub use config::CompilerConfig;
pub use document::Document;
pub use error::{CompileError, ConfigError, Result};
pub use fingerprint::{compute_fingerprint, Fingerprint};
pub use registry::{find_common_schemas, DedupRegistry, PreRegisteredValidator, PreRegistry};
pub use routes::{RouteInfo, RouteParameter};
pub use schema::{NodeParser, ParseOptions, SchemaKind, SchemaNode};

//! # batchlink-schema
//!
//! Structured value model and schema validator shared by the batchlink client
//! and service.
//!
//! - [`Value`]: the typed tree every wire message is expressed in
//! - [`codec`]: MessagePack encoding of [`Value`] trees
//! - [`Schema`] / [`SchemaBuilder`]: immutable schemas built once, then used
//!   to [`verify`](Schema::verify) decoded values
//! - [`Violation`]: one failed requirement, located by path
//!
//! ## Example
//!
//! ```rust
//! use batchlink_schema::{Schema, Value};
//!
//! let schema = Schema::map()
//!     .entry("name", Schema::text().build().unwrap())
//!     .entry("age", Schema::number().minimum(0).build().unwrap())
//!     .build()
//!     .unwrap();
//!
//! let value = Value::map([("name", Value::from("x"))]);
//! let violations = schema.verify(value).unwrap_err();
//! assert_eq!(violations.len(), 1);
//! assert_eq!(violations[0].path, "age");
//! ```

pub mod codec;
pub mod error;
pub mod requirement;
pub mod schema;
pub mod value;

mod builder;

pub use builder::SchemaBuilder;
pub use error::{CodecError, SchemaBuildError};
pub use requirement::{Requirement, Violation};
pub use schema::{Schema, SchemaKind};
pub use value::{Number, Value, ValueKind};

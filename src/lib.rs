/*!
# askdb - ask your database in plain language

askdb turns a natural-language question plus a database connection descriptor
into an executed SQL query and its tabular result.

## Example

```rust,ignore
use std::sync::Arc;
use askdb::config::{QueryOptions, ResolverSettings};
use askdb::query::QueryPipeline;
use askdb::reader::{resolve, ConnectionDescriptor};

let descriptor: ConnectionDescriptor = serde_json::from_str(
    r#"{"type": "csv", "config": {"csvContent": "a,b\n1,2\n3,4"}}"#,
)?;
let reader = resolve(&descriptor, &ResolverSettings::default()).await?;

let pipeline = QueryPipeline::new(oracle, QueryOptions::default());
let result = pipeline.answer("How many rows?", &[], reader.as_ref()).await?;
println!("{}", result.sql);
```

## Architecture

A request flows through a short pipeline:
- **Descriptor** (`{type, config}`) → validated into a typed [`reader::DbConnection`]
- **Resolver** → a request-scoped [`reader::Reader`] (MySQL pool or CSV loaded into in-memory SQLite)
- **Schema** → tables, columns and foreign keys ([`schema`])
- **Oracle** → SQL text or question suggestions ([`oracle`], [`query`], [`suggest`])
- **Values** → JSON-safe rows ([`value`])

The HTTP surface lives in the `askdb-rest` binary, the terminal surface in `askdb`.
*/

pub mod config;
pub mod extract;
pub mod oracle;
pub mod query;
pub mod reader;
pub mod schema;
pub mod soft;
pub mod suggest;
pub mod value;

pub use oracle::Oracle;
pub use reader::{ConnectionDescriptor, Reader};
pub use soft::Soft;
pub use value::{Rows, Value};

/// Main library error type
#[derive(thiserror::Error, Debug)]
pub enum AskdbError {
    #[error("Unsupported connection type: {0}")]
    UnsupportedConnectionType(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Introspection error: {0}")]
    IntrospectionError(String),

    #[error("Oracle error: {0}")]
    OracleError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, AskdbError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

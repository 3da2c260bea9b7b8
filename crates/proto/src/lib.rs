//! Wire types for the cloudfs MCP server.

mod methods;
mod tools;

pub use methods::*;
pub use tools::*;

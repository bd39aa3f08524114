//! SVN connector: the async seam used by the compare engine, the CLI-backed
//! client and the XML parsers behind it.

pub mod client;
pub mod connector;
pub mod parser;
pub mod types;

pub use client::SvnClient;
pub use connector::{ensure_not_cancelled, SvnConnector};
pub use parser::*;
pub use types::*;

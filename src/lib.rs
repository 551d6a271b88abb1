pub mod boundary;
pub mod error;
pub mod merge;
pub mod options;
pub mod parser;
pub mod promotion;
pub mod session;
pub mod snapshot;
pub mod syntax;
pub mod types;

#[cfg(feature = "pulldown")]
pub mod adapters;

pub use boundary::*;
pub use error::*;
pub use merge::*;
pub use options::*;
pub use parser::{BlockParser, FnBlockParser, LineBlockParser};
pub use promotion::*;
pub use session::*;
pub use snapshot::*;
pub use syntax::*;
pub use types::*;

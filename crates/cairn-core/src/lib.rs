mod error;
pub mod version;

pub use error::{CairnError, CairnResult, ErrorKind, ExitCode};

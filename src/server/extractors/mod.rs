mod session_extractor;
mod validation_extractor;

pub use session_extractor::*;
pub use validation_extractor::*;

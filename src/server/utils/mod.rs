pub mod access_utils;
pub mod link_utils;
pub mod session_utils;
pub mod signature_utils;
pub mod token_utils;
pub mod watermark_utils;

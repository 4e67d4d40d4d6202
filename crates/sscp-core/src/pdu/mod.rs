pub mod error_code;
pub mod function_code;
pub mod request;
pub mod response;

pub use error_code::{ErrorCode, ErrorResponse};
pub use function_code::FunctionCode;
pub use request::*;
pub use response::*;

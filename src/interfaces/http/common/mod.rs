//! Shared HTTP plumbing

mod caller;
mod error;
mod response;

pub use caller::{CallerId, USER_ID_HEADER};
pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;

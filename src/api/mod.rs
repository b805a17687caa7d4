pub mod error;
pub mod handlers;
pub mod live;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use handlers::AppState;
pub use routes::create_router;

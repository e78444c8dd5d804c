pub mod routes;

pub use routes::{api_router, create_router, ApiError, AppState};

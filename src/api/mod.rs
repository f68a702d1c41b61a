mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;
mod stream;
pub(crate) mod utils;
mod validation;

pub use error::ApiError;
pub use server::{router, serve};
pub use state::AppState;
pub use utils::{TENANT_HEADER, USER_HEADER};

pub use ridgeprint_core::errors::{AppError, AppResult};

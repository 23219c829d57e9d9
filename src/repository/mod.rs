mod error;
mod store;

pub use error::{RepositoryError, RepositoryResult};
pub use store::ResultRepository;

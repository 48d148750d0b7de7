pub mod db;
pub mod models;
pub mod records;
pub mod schema;
pub mod vectors;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

mod db;
mod error;
pub mod queries;
mod schema;

pub use db::Store;
pub use error::{Error, Result};

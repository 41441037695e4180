pub mod access_key;
pub mod middleware;
pub mod tokens;

pub use access_key::AccessKey;

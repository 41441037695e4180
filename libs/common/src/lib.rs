pub mod id;

pub use id::PhiloteId;

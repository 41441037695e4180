pub mod events;
pub mod fanout;
pub mod hive;
pub mod philote;
pub mod server;
pub mod transport;

pub use events::Message;
pub use hive::Hive;
pub use philote::Philote;

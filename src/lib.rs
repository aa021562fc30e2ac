pub mod backend;
pub mod codec;
pub mod commands;
pub mod config;
pub mod connection;
pub mod flags;
pub mod frame;
pub mod listen;
pub mod pagination;
pub mod server;
pub mod sort;
pub mod store;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

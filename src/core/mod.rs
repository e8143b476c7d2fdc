pub mod config;
pub mod fanout;
pub mod fusion;
pub mod message;
pub mod registry;
pub mod selection;

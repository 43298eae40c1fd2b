#![doc = include_str!("../README.md")]

pub mod server;

pub use server::{ObjectServer, config::ServerConfig, content::ContentSource};

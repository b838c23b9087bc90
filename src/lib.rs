pub mod api;
pub mod audio;
pub mod coach;
pub mod config;
pub mod error;
pub mod session;
pub mod settings;
pub mod transport;

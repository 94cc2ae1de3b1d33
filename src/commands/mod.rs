pub mod files;
pub mod server;

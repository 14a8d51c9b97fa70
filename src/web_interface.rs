// Web interface module root
pub mod types;
pub mod web_server;

pub use types::*;
pub use web_server::WebServer;

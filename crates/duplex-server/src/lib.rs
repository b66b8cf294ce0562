pub mod client_table;
pub mod desktop_streaming;
pub mod dispatch;
pub mod error;
pub mod file_transfer;
pub mod outbound;
pub mod service;
pub mod session;

pub use client_table::ClientTable;
pub use error::ServerError;

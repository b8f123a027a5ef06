pub mod http;
pub mod sweep;

pub mod http;
pub mod hub;

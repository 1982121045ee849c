pub mod connection;
pub mod email;

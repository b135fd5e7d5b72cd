pub mod auth;
pub mod scanner;

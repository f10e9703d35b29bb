pub mod forms;
pub mod handlers;
pub mod password;
pub mod repository;
pub mod session;
pub mod tokens;

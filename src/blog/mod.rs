pub mod domain;
pub mod forms;
pub mod handlers;
pub mod pagination;
pub mod repository;

pub mod memory;
pub mod model;
pub mod repository;
pub mod store;

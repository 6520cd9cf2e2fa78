pub mod migrations;
pub mod pool;
pub mod repositories;

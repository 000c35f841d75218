pub mod audit;
pub mod backup_exchange;
pub mod cases;
pub mod core;

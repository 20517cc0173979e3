pub mod db;
pub mod push;
pub mod queue;
pub mod repos;

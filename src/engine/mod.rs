pub mod assignment;
pub mod calculator;
pub mod consumer;
pub mod registry;
pub mod release;
pub mod sweeper;

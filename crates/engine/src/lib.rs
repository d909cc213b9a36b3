pub mod audit;
pub mod cache;
pub mod controller;
pub mod intake;
pub mod pipeline;
pub mod store;
pub mod trigger;

pub mod activity;
pub mod audit;
pub mod config;
pub mod network;
pub mod parser;
pub mod pipeline;
pub mod plan;
pub mod scope;
pub mod shared;
pub mod store;

pub mod app;
pub mod avail_resources;
pub mod common;
pub mod constraint_solver;
pub mod filter;
pub mod filters;
pub mod inventory;
pub mod node;
pub mod numa;
pub mod optimizer;
pub mod search;
pub mod snapshot;

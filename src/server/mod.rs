mod account;
mod admin;
mod dashboard;
mod debug;
pub mod dto;
mod photos;
mod projects;
pub mod response;
mod router;
mod sites;
mod storage;
pub mod validation;

pub use router::{AppState, create_router};

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod images;
pub mod session;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testing;

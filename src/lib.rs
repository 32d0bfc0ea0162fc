pub mod app;
pub mod cleanup;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod fs_util;
pub mod imgt;
pub mod library;
pub mod output;

pub mod app;
pub mod async_task;
pub mod cli;
pub mod config;
pub mod detail;
pub mod error;
pub mod event;
pub mod layout;
pub mod location;
pub mod main_lib;
pub mod observer;
pub mod screenshot;
pub mod search;
pub mod selection;
pub mod source;
pub mod theme;
pub mod tree;
pub mod ui;

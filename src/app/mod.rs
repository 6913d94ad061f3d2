mod backend;
mod data_io;
mod error;
mod filter;
mod logging;
mod model;
mod poller;
mod runtime;
mod session;
mod store;
mod tabs;
mod tui;
mod types;
mod ui_utils;
mod window;

pub use runtime::run;

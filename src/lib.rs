#![forbid(unsafe_code)]

pub mod books;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod covers;
pub mod error;
pub mod extract;
pub mod formats;
pub mod logging;
pub mod paginate;
pub mod pipeline;
pub mod price;
pub mod render;
pub mod retry;
pub mod robots;
pub mod selectors;
pub mod table;

pub mod case;
pub mod cli;
pub mod config;
pub mod evidence;
pub mod expanded;
pub mod host;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod report;
pub mod sources;
pub mod tool;
pub mod util;

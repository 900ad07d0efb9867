pub mod config;
pub mod control;
pub mod driver;
pub mod gcode;
pub mod hardware;
pub mod lifecycle;
pub mod printer;
pub mod scheduler;
pub mod soak;
pub mod status;

pub use config::{Config, load_config};
pub use printer::{Printer, PrinterError, Reply};

pub mod drivers;

pub use drivers::DriverController;

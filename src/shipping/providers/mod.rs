pub mod shiprocket;

pub use shiprocket::{ShiprocketClient, ShiprocketConfig};

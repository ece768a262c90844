// Utility modules

pub mod encoding;
pub mod io;

pub mod logging;
pub mod session;

/// console logger setup for demos and tests
pub mod logging;

pub mod calibration;
pub mod config;
pub mod evaluation;
pub mod features;
pub mod model;
pub mod predictor;
pub mod registry;
pub mod report_export;
pub mod store;
pub mod synthetic;
pub mod training;

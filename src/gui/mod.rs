pub mod application;
pub mod navigation;
pub mod screens;
pub mod style;
pub mod types;

pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod platform;
pub mod processing;
pub mod tasks {
    pub mod frame;
}

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod source;
pub mod web;
pub mod tasks {
    pub mod slideshow;
}

//! Configuration access port trait.
//!
//! Values come back as raw strings; typing, defaults and error reporting
//! live in `domain::config_validation` so a malformed value is always an
//! error naming its `[section] key`.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
}

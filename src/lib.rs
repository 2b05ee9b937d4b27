pub mod chord;
pub mod config;
pub mod db;
pub mod import;
pub mod keys;
pub mod markov;
pub mod similarity;
pub mod transpose;
pub mod validate;

/// Application name for XDG paths
pub const APP_NAME: &str = "chordwise";

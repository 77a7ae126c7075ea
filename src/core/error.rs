use rusqlite;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AndroshError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Manifest parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Checksum verification failed for {} after {attempts} attempt(s)", path.display())]
    Verification { path: PathBuf, attempts: u32 },
    #[error("Privileged command `{command}` failed (exit {exit_code}): {stderr}")]
    PrivilegedCommand {
        command: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("Cannot tokenize command: {0}")]
    Tokenize(String),
    #[error("Template error: {0}")]
    Template(String),
    #[error("Invalid instance name: {0}")]
    InvalidName(String),
    #[error("'{0}' is not set up, run `androsh setup --name {0}` first")]
    NotSetUp(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("'{0}' already exists, pass --resetup to provision it again")]
    AlreadyExists(String),
}

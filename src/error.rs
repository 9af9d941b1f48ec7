use std::io;
use std::fmt::{Debug, Display};
use std::str::Utf8Error;
use thiserror::Error;
use msgbox::IconType;
use btleplug;
use iced;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (iced): {source}")]
    Iced { #[from] source: iced::Error },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Peripheral {0} was not found during the last scan")]
    UnknownPeripheral(String),

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("Bluetooth transport failure: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, TransportError::Btle { source: btleplug::Error::PermissionDenied })
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload is not valid utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Payload is not valid JSON: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

#[derive(Error, Debug)]
pub enum LinkOpenError {
    #[error("Opening the bluetooth settings is not supported on this platform")]
    UnsupportedPlatform,

    #[error("Failed to open link: {source}")]
    IOError { #[from] source: io::Error },
}

pub fn error_msgbox<T: Display>(message: &'static str, error: &T) {
    let message = format!("{}: {}", message, error);
    eprintln!("{}", &message);
    if let Err(err) = msgbox::create(concat!("Swell ", env!("CARGO_PKG_VERSION")), &message, IconType::Error) {
        eprintln!("Failed to create msgbox: {:?}", err);
    }
}

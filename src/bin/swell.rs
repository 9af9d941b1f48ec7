use std::env;
use log::info;
use msgbox::IconType;
use swell::{init_logging, run};
use swell::error::{error_msgbox, AppRunError, ConfigError};

// This embedded Info.plist carries the Bluetooth usage description, without it macOS denies
// Bluetooth access without asking the user.
#[cfg(target_os = "macos")]
embed_plist::embed_info_plist!(concat!(env!("OUT_DIR"), "/Info.plist"));

fn main() -> Result<(), AppRunError> {
    init_logging();
    info!(concat!("Swell ", env!("CARGO_PKG_VERSION")));

    let args = env::args();

    match run(args) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            if let Err(err) = msgbox::create(
                concat!("Swell ", env!("CARGO_PKG_VERSION")),
                "Swell is already running",
                IconType::Error,
            ) {
                eprintln!("Failed to create msgbox: {:?}", err);
            }
            Ok(())
        },
        Err(err) => {
            error_msgbox("Unexpected error", &err);
            Err(err)
        }
        Ok(_) => Ok(())
    }
}

use std::{env, fs};
use std::path::PathBuf;

// macOS refuses Bluetooth access (without even prompting) unless the bundle declares why it
// needs it. The plist is embedded into the binary by src/bin/swell.rs.
const INFO_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key>
    <string>id.swell.lamp</string>
    <key>CFBundleName</key>
    <string>Swell</string>
    <key>CFBundleExecutable</key>
    <string>swell</string>
    <key>CFBundleShortVersionString</key>
    <string>{version}</string>
    <key>NSBluetoothAlwaysUsageDescription</key>
    <string>Swell uses Bluetooth to find and control your lamp.</string>
    <key>NSBluetoothPeripheralUsageDescription</key>
    <string>Swell uses Bluetooth to find and control your lamp.</string>
</dict>
</plist>
"#;

fn out_dir() -> String {
    env::var("OUT_DIR").expect("No OUT_DIR env var")
}

fn main() {
    let version = env::var("CARGO_PKG_VERSION").expect("No CARGO_PKG_VERSION env var");
    let out_path: PathBuf = [out_dir().as_str(), "Info.plist"].iter().collect();

    let content = INFO_PLIST.replace("{version}", &version);
    fs::write(&out_path, content).expect("Failed to write Info.plist");

    println!("cargo:rerun-if-changed=build.rs");
}

//! Bakes the network settings into the image.
//!
//! Values come from the process environment or from a `.env` file next to
//! this crate. A missing credential list fails at boot, not at build time.

const BAKED: [&str; 4] = [
    "BOAT32_WIFI_CREDENTIALS",
    "BOAT32_OVERLAY_HOSTNAME",
    "BOAT32_OVERLAY_JOIN_CODE",
    "BOAT32_OVERLAY_DASHBOARD",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    // A missing .env just means everything comes from the environment.
    let _ = dotenvy::dotenv();

    for name in BAKED {
        println!("cargo:rerun-if-env-changed={name}");
        let value = std::env::var(name).unwrap_or_default();
        println!("cargo:rustc-env={name}={value}");
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

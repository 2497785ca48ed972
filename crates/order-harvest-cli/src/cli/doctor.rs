// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use anyhow::Result;
use std::path::Path;

use order_harvest::config::{resolve_config_path, HarvestConfig};
use order_harvest::renderer::chromium::find_chromium;

/// Check Chromium availability, the browser profile, the list URL and the
/// output directories.
pub fn run(config: &HarvestConfig, explicit_config: Option<&str>) -> Result<()> {
    println!("Order Harvest Doctor");
    println!("====================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    match resolve_config_path(explicit_config) {
        Some(path) => println!("[OK] Config file: {}", path.display()),
        None => println!("[??] No config file; using built-in defaults"),
    }

    let chromium = config.chromium_path.clone().or_else(find_chromium);
    let chromium_ok = match &chromium {
        Some(path) if path.exists() => {
            println!("[OK] Chromium found: {}", path.display());
            true
        }
        Some(path) => {
            println!("[!!] Chromium path does not exist: {}", path.display());
            false
        }
        None => {
            println!("[!!] Chromium NOT found. Install Chrome or set HARVEST_CHROMIUM_PATH.");
            false
        }
    };

    let url_ok = match &config.list_url {
        Some(url) => {
            println!("[OK] List URL: {url}");
            true
        }
        None => {
            println!("[!!] No list URL. Pass --url or set HARVEST_LIST_URL.");
            false
        }
    };

    match &config.profile_dir {
        Some(dir) if dir.is_dir() => println!("[OK] Browser profile: {}", dir.display()),
        Some(dir) => println!(
            "[??] Browser profile {} does not exist yet; the portal will ask you to sign in",
            dir.display()
        ),
        None => println!("[??] No browser profile; each run starts signed out"),
    }

    let output_ok = check_writable("Output directory", &config.output_dir);
    let diagnostics_ok = check_writable("Diagnostics directory", &config.diagnostics_dir);

    println!();
    if chromium_ok && url_ok && output_ok && diagnostics_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        if !chromium_ok {
            println!("  Install Chrome or Chromium, or point --chromium at a binary.");
        }
    }

    Ok(())
}

fn check_writable(label: &str, dir: &Path) -> bool {
    match check_dir_writable(dir) {
        Ok(()) => {
            println!("[OK] {label} is writable: {}", dir.display());
            true
        }
        Err(e) => {
            println!("[!!] {label} {} is not writable: {e}", dir.display());
            false
        }
    }
}

/// Create `dir` if needed and write then remove a scratch file.
fn check_dir_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let scratch = dir.join(format!(".doctor-check-{}", std::process::id()));
    std::fs::write(&scratch, b"ok")?;
    std::fs::remove_file(&scratch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writable_check_creates_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        assert!(check_dir_writable(&nested).is_ok());
        assert!(nested.is_dir());
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }

    #[test]
    fn test_writable_check_fails_under_a_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        assert!(check_dir_writable(&file.join("sub")).is_err());
    }
}

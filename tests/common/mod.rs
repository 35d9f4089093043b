use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Write an executable `/bin/sh` script into `dir`.
#[cfg(unix)]
#[allow(dead_code)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("failed to write script");
    let mut perms = fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("failed to chmod script");
    path
}

/// Script that atomically saves its stdin to `out`.
#[cfg(unix)]
#[allow(dead_code)]
pub fn capture_script(dir: &Path, name: &str, out: &Path) -> PathBuf {
    let tmp = out.with_extension("partial");
    write_script(
        dir,
        name,
        &format!("cat > {} && mv {} {}", tmp.display(), tmp.display(), out.display()),
    )
}

/// Poll until `path` exists with content, or give up after five seconds.
#[allow(dead_code)]
pub async fn wait_for_file(path: &Path) -> Option<String> {
    for _ in 0..100 {
        if let Ok(contents) = fs::read_to_string(path) {
            if !contents.is_empty() {
                return Some(contents);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}

//! Point the user at a usable FFmpeg install before `ffmpeg-sys-next`
//! fails with a less helpful error.

use std::env;
use std::path::{Path, PathBuf};

fn main() {
    for variable in ["FFMPEG_DIR", "PKG_CONFIG_PATH", "VCPKG_ROOT", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let candidates = match target_os.as_str() {
        "windows" => vcpkg_candidates(),
        "macos" => vec![
            PathBuf::from("/opt/homebrew/opt/ffmpeg"),
            PathBuf::from("/usr/local/opt/ffmpeg"),
        ],
        // pkg-config finds distribution packages on other targets.
        _ => return,
    };

    match candidates.iter().find(|path| has_ffmpeg_headers(path)) {
        Some(found) => println!(
            "cargo:warning=movieprint: found FFmpeg at {0}; set FFMPEG_DIR={0} if the build cannot locate it",
            found.display()
        ),
        None if target_os == "windows" => println!(
            "cargo:warning=movieprint: FFMPEG_DIR is not set; install FFmpeg with vcpkg and set VCPKG_ROOT or FFMPEG_DIR"
        ),
        None => {}
    }
}

fn vcpkg_candidates() -> Vec<PathBuf> {
    let Some(root) = env::var_os("VCPKG_ROOT") else {
        return Vec::new();
    };
    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    vec![PathBuf::from(root).join("installed").join(triplet)]
}

fn has_ffmpeg_headers(prefix: &Path) -> bool {
    prefix.join("include").join("libavcodec").join("avcodec.h").exists()
}

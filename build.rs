//! Build script that checks the system OpenCV for the modules the tracker links.
//!
//! Missing pieces only produce warnings; the `opencv` crate's own build fails
//! with the linker error if a module is really absent.

use std::process::Command;

/// OpenCV modules matching the `opencv` crate features, with what uses them
const REQUIRED_MODULES: [(&str, &str); 5] = [
    ("imgproc", "HSV thresholding, morphology and contour search"),
    ("calib3d", "stereo rectification maps and SGBM disparity"),
    ("videoio", "camera and recorded video capture"),
    ("imgcodecs", "16-bit depth PNG replay"),
    ("highgui", "the annotated preview windows"),
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rerun-if-env-changed=OPENCV_LINK_LIBS");

    let Some((package, version)) = find_opencv() else {
        println!("cargo:warning=No opencv4/opencv pkg-config entry; the tracker needs OpenCV 4 with calib3d");
        println!("cargo:warning=Debian/Ubuntu: apt-get install libopencv-dev pkg-config");
        println!("cargo:warning=macOS: brew install opencv pkg-config");
        return;
    };

    let libs = pkg_config(&["--libs", package]).unwrap_or_default();
    let missing: Vec<_> = REQUIRED_MODULES
        .iter()
        .filter(|(module, _)| !libs.contains(&format!("opencv_{module}")))
        .collect();

    if missing.is_empty() {
        return;
    }
    println!("cargo:warning=OpenCV {version} ({package}) lacks modules the tracker links:");
    for (module, purpose) in missing {
        println!("cargo:warning=  opencv_{module}: {purpose}");
    }
}

/// First pkg-config package providing OpenCV, with its version
fn find_opencv() -> Option<(&'static str, String)> {
    ["opencv4", "opencv"]
        .into_iter()
        .find_map(|package| pkg_config(&["--modversion", package]).map(|v| (package, v)))
}

fn pkg_config(args: &[&str]) -> Option<String> {
    let output = Command::new("pkg-config").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

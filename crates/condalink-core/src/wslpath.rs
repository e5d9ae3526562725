//! Windows-to-WSL path translation.
//!
//! Pure string rewriting: the caller is responsible for checking that a
//! translated path actually exists before relying on it.

/// Translate a Windows host path into its WSL equivalent.
///
/// `C:\Users\scan.vtk` becomes `/mnt/c/Users/scan.vtk`. Trailing whitespace
/// and carriage returns are stripped, backslashes become forward slashes,
/// and a leading drive marker (`X:`) is rewritten to the `/mnt/x` mount
/// convention with the drive letter lower-cased.
///
/// Total function: a string without a drive marker is returned with only
/// separator normalization applied.
pub fn to_wsl_path(host_path: &str) -> String {
    let path = host_path.trim().replace('\\', "/");

    match path.split_once(':') {
        Some((drive, rest)) => {
            format!("/mnt/{}{}", drive.to_lowercase(), rest)
        }
        None => path,
    }
}

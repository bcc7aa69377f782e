//! C1's restart action: replace the current process image with itself,
//! passing through the original argument vector untouched. This is the
//! Rust analogue of the original's `os.execv(sys.executable, sys.argv)` —
//! implemented with `nix::unistd::execv` rather than forking, so in-flight
//! supervisor children are reparented rather than killed.

use std::ffi::CString;

use nix::unistd::execv;

#[derive(Debug, thiserror::Error)]
pub enum RestartError {
    #[error("current executable path is not valid UTF-8 / contains a NUL byte")]
    BadPath,
    #[error("execv failed: {0}")]
    Exec(#[from] nix::Error),
}

/// Never returns on success — the process image is replaced. Returns an
/// error only if re-exec could not even be attempted (path or argv could
/// not be converted to a C string).
pub fn exec_self() -> Result<std::convert::Infallible, RestartError> {
    let current_exe = std::env::current_exe().map_err(|_| RestartError::BadPath)?;
    let path = CString::new(current_exe.to_str().ok_or(RestartError::BadPath)?).map_err(|_| RestartError::BadPath)?;

    let args: Vec<CString> = std::env::args()
        .map(|a| CString::new(a).map_err(|_| RestartError::BadPath))
        .collect::<Result<_, _>>()?;

    Ok(execv(&path, &args)?)
}

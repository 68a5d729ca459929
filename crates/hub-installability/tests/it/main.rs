#[cfg(feature = "pypi")]
mod pypi;
mod requirements;
mod scripted;

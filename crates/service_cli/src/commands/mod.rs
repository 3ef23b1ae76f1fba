//! CLI command implementations
//!
//! Each submodule implements a specific CLI command.

pub mod calibrate;
pub mod check;
pub mod closed_form;
pub mod run;

use tracing::info;

use crate::Result;

/// Writes `rendered` to `path`, or to stdout when no path is given.
pub(crate) fn emit(rendered: &str, path: Option<&str>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!(path, "Output written");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

//! Construction of the rsync command line for a watch.
//!
//! The command is built once when the watch is added and reused for every
//! transfer. Its shape:
//!
//! ```text
//! <rsync> [--delete] [--exclude=<p>]... <-avhzS | -dlptgoDvhzS> -q
//!         [--rsh=<ssh> -S <control path>] <source> <destination>
//! ```
//!
//! The exclude flags come from the same pattern list the change filter
//! uses, so an ignored change never has its file transferred by a later run.

use std::fmt;

use camino::Utf8PathBuf;
use mimic_core::{DaemonConfig, WatchSpec};

/// Archive mode, recursing into subdirectories.
const RECURSIVE_FLAGS: &str = "-avhzS";

/// Archive mode without recursion: top-level entries only, directories
/// created but not descended into.
const FLAT_FLAGS: &str = "-dlptgoDvhzS";

/// A fully-resolved transfer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    program: String,
    args: Vec<String>,
}

impl TransferCommand {
    /// Builds the transfer command for `spec` using the tools named in `config`.
    ///
    /// A remote shell routed through the pooled control socket is added only
    /// when the watch maintains a connection and the destination is remote.
    /// If the control socket is missing at transfer time ssh connects
    /// directly, so the command stays valid when no master could be opened.
    #[must_use]
    pub fn build(spec: &WatchSpec, config: &DaemonConfig) -> Self {
        let mut args = Vec::with_capacity(spec.options.exclude.len() + 6);

        if spec.options.delete_extraneous {
            args.push("--delete".to_owned());
        }
        args.extend(
            spec.options
                .exclude
                .iter()
                .map(|pattern| format!("--exclude={pattern}")),
        );
        args.push(
            if spec.options.recursive {
                RECURSIVE_FLAGS
            } else {
                FLAT_FLAGS
            }
            .to_owned(),
        );
        args.push("-q".to_owned());

        if let Some(control) = control_path(spec, config) {
            args.push(format!("--rsh={} -S {control}", config.ssh_path));
        }

        args.push(spec.source.to_string());
        args.push(spec.destination.to_string());

        Self {
            program: config.rsync_path.clone(),
            args,
        }
    }

    /// Returns the program to execute.
    #[inline]
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments, excluding the program.
    #[inline]
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for TransferCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Returns the ssh control socket a watch's transfers should go through.
///
/// `None` for local destinations and for watches that do not maintain a
/// connection.
#[must_use]
pub fn control_path(spec: &WatchSpec, config: &DaemonConfig) -> Option<Utf8PathBuf> {
    if !spec.options.maintain_connection {
        return None;
    }
    let host = spec.destination.host_key()?;
    Some(config.control_dir.join(host.control_file_name()))
}

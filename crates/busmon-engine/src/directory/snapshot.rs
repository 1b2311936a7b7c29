//! Initial directory population.

use std::time::Duration;

use busmon_core::is_numeric_address;

use super::NameDirectory;
use crate::transport::DirectoryLink;

/// Outcome of a snapshot load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotResult {
    /// Names enumerated on the bus
    pub names: usize,
    /// Well-known names whose owner was resolved
    pub owners: usize,
    /// Names whose owning pid was resolved
    pub pids: usize,
    /// Individual queries that failed
    pub failed: usize,
}

/// Fills `directory` from the enumerated `names`.
///
/// For every well-known name the owner is queried and recorded. For every
/// name the owning pid is queried; it is recorded under the name itself
/// when the name is a numeric address, otherwise under the resolved owner.
/// Failed queries are reported and skipped.
pub fn load_snapshot(
    directory: &mut NameDirectory,
    link: &dyn DirectoryLink,
    names: &[String],
    timeout: Duration,
    verbose: bool,
) -> SnapshotResult {
    let mut result = SnapshotResult {
        names: names.len(),
        ..SnapshotResult::default()
    };
    let diagnostics = directory.diagnostics.clone();

    if verbose {
        diagnostics.debug(format_args!("known bus names: {names:?}"));
    }

    for name in names {
        let numeric = is_numeric_address(name);

        let owner = if numeric {
            Some(name.clone())
        } else {
            match link.name_owner(name, timeout) {
                Ok(owner) if !owner.is_empty() => {
                    directory.record_name_owner(name, &owner);
                    result.owners += 1;
                    if verbose {
                        diagnostics.debug(format_args!("name owner: {name} {owner}"));
                    }
                    Some(owner)
                }
                Ok(_) => None,
                Err(err) => {
                    result.failed += 1;
                    diagnostics.warn(format_args!("failed to query owner of {name}: {err}"));
                    None
                }
            }
        };

        match link.unix_process_id(name, timeout) {
            Ok(pid) if pid > 0 => {
                if let Some(owner) = &owner {
                    directory.record_pid(owner, pid);
                    result.pids += 1;
                }
                if verbose {
                    diagnostics.debug(format_args!("name pid: {name} {pid}"));
                }
            }
            Ok(_) => {}
            Err(err) => {
                result.failed += 1;
                diagnostics.warn(format_args!(
                    "call to GetConnectionUnixProcessID failed for {name}: {err}"
                ));
            }
        }
    }

    result
}

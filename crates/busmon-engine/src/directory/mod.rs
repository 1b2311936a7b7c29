//! Name directory - address ↔ names ↔ pid cache.
//!
//! Populated once from a snapshot of the bus at session start
//! ([`load_snapshot`]), then corrected incrementally by the capture filter
//! as clients connect and names are acquired or lost.
//!
//! Resolution is best-effort. Every lookup is total: an unknown address has
//! no names and pid `0`, an unknown name has no address.
//!
//! # Panic-Free Guarantees
//!
//! No indexing or unwrapping; all lookups go through `HashMap::get`.

mod snapshot;

pub use snapshot::{load_snapshot, SnapshotResult};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use busmon_core::{Diagnostics, PeerIdentity};

/// Owned-name and pid index of the bus.
pub struct NameDirectory {
    /// Names owned by each address, in acquisition order.
    names_by_addr: HashMap<String, Vec<String>>,

    /// Owning process of each address.
    pids_by_addr: HashMap<String, u32>,

    diagnostics: Arc<dyn Diagnostics>,
}

impl NameDirectory {
    pub fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            names_by_addr: HashMap::new(),
            pids_by_addr: HashMap::new(),
            diagnostics,
        }
    }

    /// Records that `addr` owns `name`.
    ///
    /// A name has at most one owner: if another address held it, it is
    /// moved. Recording a name twice for the same address is a no-op.
    pub fn record_name_owner(&mut self, name: &str, addr: &str) {
        if name.is_empty() || addr.is_empty() {
            return;
        }

        if let Some(previous) = self.address_for(name).map(str::to_string) {
            if previous == addr {
                return;
            }
            self.remove_name_owner(&previous, name);
        }

        self.names_by_addr
            .entry(addr.to_string())
            .or_default()
            .push(name.to_string());
    }

    /// Removes `name` from the names owned by `addr`.
    ///
    /// Returns true if the name was present.
    pub fn remove_name_owner(&mut self, addr: &str, name: &str) -> bool {
        let Some(names) = self.names_by_addr.get_mut(addr) else {
            return false;
        };
        let before = names.len();
        names.retain(|n| n != name);
        let removed = names.len() != before;
        if names.is_empty() {
            self.names_by_addr.remove(addr);
        }
        removed
    }

    /// Records the owning process of `addr`. Pid `0` means unknown and is
    /// ignored.
    pub fn record_pid(&mut self, addr: &str, pid: u32) {
        if addr.is_empty() || pid == 0 {
            return;
        }
        self.pids_by_addr.insert(addr.to_string(), pid);
    }

    /// Names owned by `addr`, oldest first.
    pub fn names_for(&self, addr: &str) -> &[String] {
        self.names_by_addr
            .get(addr)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Address currently owning `name`.
    pub fn address_for(&self, name: &str) -> Option<&str> {
        if name.is_empty() {
            return None;
        }
        let found = self
            .names_by_addr
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == name))
            .map(|(addr, _)| addr.as_str());
        if found.is_none() {
            self.diagnostics
                .debug(format_args!("failed to resolve address of name {name}"));
        }
        found
    }

    /// Owning pid of `addr`, `0` if unknown.
    pub fn pid_for(&self, addr: &str) -> u32 {
        if addr.is_empty() {
            return 0;
        }
        match self.pids_by_addr.get(addr) {
            Some(pid) => *pid,
            None => {
                self.diagnostics
                    .debug(format_args!("cannot resolve pid for {addr}"));
                0
            }
        }
    }

    /// Identity of `addr` with names and pid filled in. The executable path
    /// is left empty.
    pub fn identity_of(&self, addr: &str) -> PeerIdentity {
        PeerIdentity {
            address: addr.to_string(),
            names: self.names_for(addr).to_vec(),
            pid: self.pid_for(addr),
            exe: String::new(),
        }
    }

    /// Every address with at least one name or a known pid, sorted.
    pub fn known_addresses(&self) -> Vec<&str> {
        self.names_by_addr
            .keys()
            .chain(self.pids_by_addr.keys())
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of known addresses.
    pub fn len(&self) -> usize {
        self.known_addresses().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names_by_addr.is_empty() && self.pids_by_addr.is_empty()
    }
}

impl std::fmt::Debug for NameDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameDirectory")
            .field("names_by_addr", &self.names_by_addr)
            .field("pids_by_addr", &self.pids_by_addr)
            .finish_non_exhaustive()
    }
}

//! Namespace selection for the `unshare` and `nsenter` helpers.
//!
//! A shared session namespace is created with every namespace the helper
//! supports and joined on the mount, PID, UTS, and IPC namespaces. Network
//! and user namespaces are never entered by joiners.

/// Which namespaces to create or join.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceSelection {
    /// Mount namespace.
    pub mount: bool,
    /// PID namespace.
    pub pid: bool,
    /// UTS (hostname) namespace.
    pub uts: bool,
    /// IPC namespace.
    pub ipc: bool,
    /// Network namespace.
    pub network: bool,
    /// User namespace.
    pub user: bool,
}

impl NamespaceSelection {
    /// Every namespace.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            mount: true,
            pid: true,
            uts: true,
            ipc: true,
            network: true,
            user: true,
        }
    }

    /// The namespaces a joining session enters.
    #[must_use]
    pub const fn joinable() -> Self {
        Self {
            mount: true,
            pid: true,
            uts: true,
            ipc: true,
            network: false,
            user: false,
        }
    }

    const fn is_all(&self) -> bool {
        self.mount && self.pid && self.uts && self.ipc && self.network && self.user
    }

    fn short_flags(&self) -> Vec<String> {
        [
            (self.mount, "-m"),
            (self.pid, "-p"),
            (self.uts, "-u"),
            (self.ipc, "-i"),
            (self.network, "-n"),
            (self.user, "-U"),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .map(|(_, flag)| flag.to_owned())
        .collect()
    }

    /// Arguments for `unshare`, always forking so the child becomes PID 1
    /// of the new PID namespace.
    #[must_use]
    pub fn unshare_args(&self) -> Vec<String> {
        let mut args = if self.is_all() {
            vec!["-a".to_owned()]
        } else {
            self.short_flags()
        };
        args.push("-f".to_owned());
        args
    }

    /// Arguments for `nsenter` targeting the namespaces of `pid`.
    #[must_use]
    pub fn nsenter_args(&self, pid: u32) -> Vec<String> {
        let mut args = vec!["-t".to_owned(), pid.to_string()];
        args.extend(self.short_flags());
        args
    }
}

//! System-wide constants and default paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "shellns";

/// Local-state directory under the prefix (markers, `/proc` shims).
pub const LOCAL_DIR_NAME: &str = "local";

/// Helper binary directory under the local-state directory.
pub const BIN_DIR_NAME: &str = "bin";

/// Home directory inside the container.
pub const GUEST_HOME: &str = "/root";

/// Shell inside the container.
pub const GUEST_SHELL: &str = "/bin/sh";

/// Init binary inside the container, run as the namespace's PID 1.
pub const GUEST_INIT: &str = "/sbin/init";

/// Shell command that lands an interactive shell in the guest home.
pub const GUEST_LOGIN: &str = "cd /root && exec /bin/sh";

/// File name of the proot helper inside the native library directory.
pub const PROOT_LIBRARY: &str = "libproot.so";

/// File name of the staged proot helper.
pub const PROOT_BINARY: &str = "proot";

/// 64-bit dynamic linker used to run the proot helper.
pub const LINKER64: &str = "/system/bin/linker64";

/// 32-bit dynamic linker used when no 64-bit linker exists.
pub const LINKER32: &str = "/system/bin/linker";

/// Host directories bind-mounted into a chroot container, same path inside.
pub const CHROOT_BIND_PATHS: &[&str] = &["/sdcard", "/storage", "/data/data", "/system", "/vendor"];

/// Host directories bound into a proot container in addition to the chroot set.
pub const PROOT_EXTRA_BIND_PATHS: &[&str] = &["/apex", "/linkerconfig"];

/// Fixed host-to-guest binds for proot: fd and stdio shims plus the random device.
pub const PROOT_DEVICE_BINDS: &[(&str, &str)] = &[
    ("/proc/self/fd", "/proc/self/fd"),
    ("/proc/self/fd/0", "/dev/stdin"),
    ("/proc/self/fd/1", "/dev/stdout"),
    ("/proc/self/fd/2", "/dev/stderr"),
    ("/dev/urandom", "/dev/random"),
];

/// Shim file bound over `/proc/stat` in proot sessions.
pub const STAT_SHIM_NAME: &str = "stat";

/// Shim file bound over `/proc/vmstat` in proot sessions.
pub const VMSTAT_SHIM_NAME: &str = "vmstat";

/// Static `/proc/stat` served to proot guests, which cannot read the host's.
pub const STAT_SHIM: &str = "\
cpu  1957 0 2877 93280 262 342 254 87 0 0
cpu0 31 0 226 12027 82 10 4 9 0 0
cpu1 45 0 664 11144 21 263 233 12 0 0
cpu2 494 0 537 11283 27 10 3 8 0 0
cpu3 359 0 234 11723 24 26 5 7 0 0
cpu4 295 0 268 11772 10 12 2 12 0 0
cpu5 270 0 251 11833 15 3 1 10 0 0
cpu6 430 0 520 11386 30 8 1 12 0 0
cpu7 30 0 172 12108 50 8 1 13 0 0
intr 127541 38 290 0 0 0 0 4 0 1 0 0 25329 258 0 5777 277 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
ctxt 140223
btime 1680020856
processes 772
procs_running 2
procs_blocked 0
softirq 75663 0 5903 6 25375 10774 0 243 11685 0 21677
";

/// Static `/proc/vmstat` served to proot guests.
pub const VMSTAT_SHIM: &str = "\
nr_free_pages 1743136
nr_zone_inactive_anon 179281
nr_zone_active_anon 7183
nr_zone_inactive_file 22858
nr_zone_active_file 51328
nr_zone_unevictable 642
nr_zone_write_pending 0
nr_mlock 0
nr_bounce 0
nr_zspages 0
nr_free_cma 0
nr_inactive_anon 179281
nr_active_anon 7183
nr_inactive_file 22858
nr_active_file 51328
nr_unevictable 642
nr_slab_reclaimable 8091
nr_slab_unreclaimable 7804
nr_anon_pages 183034
nr_mapped 8930
nr_file_pages 77827
nr_dirty 0
nr_writeback 0
nr_shmem 3641
nr_kernel_stack 2416
nr_page_table_pages 1349
pgpgin 198319
pgpgout 153148
pswpin 0
pswpout 0
pgalloc_normal 932021
pgfree 2675587
pgactivate 100329
pgfault 718640
pgmajfault 1037
";

/// How many times a new owner's marker is polled before giving up.
pub const MARKER_POLL_ATTEMPTS: u32 = 40;

/// Delay between marker polls.
pub const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Grace period between SIGTERM and SIGKILL when terminating a session.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Returns the local-state directory for a prefix.
#[must_use]
pub fn local_dir(prefix: &Path) -> PathBuf {
    prefix.join(LOCAL_DIR_NAME)
}

/// Returns the helper binary directory for a prefix.
#[must_use]
pub fn local_bin_dir(prefix: &Path) -> PathBuf {
    local_dir(prefix).join(BIN_DIR_NAME)
}

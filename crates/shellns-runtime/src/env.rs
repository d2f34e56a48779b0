//! Environment handed to a session process.

use std::path::PathBuf;

use shellns_common::config::SessionConfig;
use shellns_common::types::SessionId;

/// Host variables forwarded unchanged when they are set.
const PASSTHROUGH: &[&str] = &[
    "ANDROID_ART_ROOT",
    "ANDROID_DATA",
    "ANDROID_I18N_ROOT",
    "ANDROID_ROOT",
    "ANDROID_RUNTIME_ROOT",
    "ANDROID_TZDATA_ROOT",
    "BOOTCLASSPATH",
    "DEX2OATBOOTCLASSPATH",
    "EXTERNAL_STORAGE",
];

/// proot loaders exported when the native library directory ships them.
const LOADERS: &[(&str, &str)] = &[
    ("PROOT_LOADER", "libproot-loader.so"),
    ("PROOT_LOADER32", "libproot-loader32.so"),
];

/// Host-side `HOME` for session processes.
const HOST_HOME: &str = "/sdcard";

/// Shared temporary directory under the prefix.
#[must_use]
pub fn tmp_dir(config: &SessionConfig) -> PathBuf {
    config.prefix_dir.join("tmp")
}

/// Per-session proot scratch directory.
#[must_use]
pub fn session_tmp_dir(config: &SessionConfig, session: &SessionId) -> PathBuf {
    tmp_dir(config).join(session.as_str())
}

/// Builds the `KEY=VALUE` environment for a session, reading host
/// variables from the current process.
#[must_use]
pub fn session_environment(config: &SessionConfig, session: &SessionId) -> Vec<String> {
    session_environment_with(config, session, |key| std::env::var(key).ok())
}

/// Builds the session environment with an explicit host lookup.
pub fn session_environment_with(
    config: &SessionConfig,
    session: &SessionId,
    host: impl Fn(&str) -> Option<String>,
) -> Vec<String> {
    let bin = config.bin_dir();
    let host_path = host("PATH").unwrap_or_default();

    let mut env = vec![
        format!("PATH={host_path}:/sbin:{}", bin.display()),
        format!("HOME={HOST_HOME}"),
        "COLORTERM=truecolor".to_owned(),
        "TERM=xterm-256color".to_owned(),
        "LANG=C.UTF-8".to_owned(),
        format!("BIN={}", bin.display()),
        format!("PREFIX={}", config.prefix_dir.display()),
        format!("LD_LIBRARY_PATH={}", config.local_dir().join("lib").display()),
        format!("LINKER={}", config.tools.linker),
        format!("NATIVE_LIB_DIR={}", config.native_lib_dir.display()),
        format!("PROOT_TMP_DIR={}", session_tmp_dir(config, session).display()),
        format!("TMPDIR={}", tmp_dir(config).display()),
    ];

    for (key, file) in LOADERS {
        let loader = config.native_lib_dir.join(file);
        if loader.exists() {
            env.push(format!("{key}={}", loader.display()));
        }
    }

    if config.seccomp {
        env.push("SECCOMP=1".to_owned());
    }

    env.extend(
        PASSTHROUGH
            .iter()
            .filter_map(|key| host(key).map(|value| format!("{key}={value}"))),
    );
    env
}

#[cfg(test)]
mod tests {
    use shellns_common::types::ContainerMode;

    use super::*;

    fn config(dir: &std::path::Path) -> SessionConfig {
        SessionConfig::new(
            ContainerMode::Chroot,
            dir.join("alpine"),
            dir.join("lib"),
            dir.join("usr"),
        )
    }

    fn lookup(key: &str) -> Option<String> {
        match key {
            "PATH" => Some("/system/bin".into()),
            "ANDROID_ROOT" => Some("/system".into()),
            _ => None,
        }
    }

    fn value<'a>(env: &'a [String], key: &str) -> Option<&'a str> {
        env.iter()
            .find_map(|kv| kv.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')))
    }

    #[test]
    fn path_appends_sbin_and_local_bin() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let env = session_environment_with(&cfg, &SessionId::new("s1"), lookup);

        assert_eq!(
            value(&env, "PATH").unwrap(),
            format!("/system/bin:/sbin:{}", cfg.bin_dir().display())
        );
        assert_eq!(value(&env, "TERM"), Some("xterm-256color"));
    }

    #[test]
    fn proot_tmp_dir_is_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let env = session_environment_with(&cfg, &SessionId::new("abc"), lookup);
        assert!(value(&env, "PROOT_TMP_DIR").unwrap().ends_with("tmp/abc"));
    }

    #[test]
    fn seccomp_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        let id = SessionId::new("s");
        assert!(value(&session_environment_with(&cfg, &id, lookup), "SECCOMP").is_none());

        cfg.seccomp = true;
        assert_eq!(value(&session_environment_with(&cfg, &id, lookup), "SECCOMP"), Some("1"));
    }

    #[test]
    fn only_set_host_variables_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let env = session_environment_with(&config(dir.path()), &SessionId::new("s"), lookup);
        assert_eq!(value(&env, "ANDROID_ROOT"), Some("/system"));
        assert!(value(&env, "ANDROID_DATA").is_none());
    }

    #[test]
    fn loader_exported_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        std::fs::create_dir_all(&cfg.native_lib_dir).unwrap();
        std::fs::write(cfg.native_lib_dir.join("libproot-loader.so"), b"").unwrap();

        let env = session_environment_with(&cfg, &SessionId::new("s"), lookup);

        assert!(value(&env, "PROOT_LOADER").unwrap().ends_with("libproot-loader.so"));
        assert!(value(&env, "PROOT_LOADER32").is_none());
    }
}

//! Configuration layering and startup switch filtering.

use std::ffi::{OsStr, OsString};
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use warden_config::{Config, DEFAULT_LOG_FILTER, LogFormat, StartupOptions};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe in edition 2024; the guard serialises
        // every test that touches it.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

fn lock_env() -> MutexGuard<'static, ()> {
    ENV_MUTEX.lock().expect("env mutex poisoned")
}

#[test]
fn defaults_apply_without_overrides() {
    let _guard = lock_env();
    let config = Config::load_from_iter([OsString::from("wardend")]).expect("defaults load");
    assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
    assert_eq!(config.log_format(), LogFormat::Json);
    assert!(!config.detach);
    assert!(config.dependency_url.is_none());
}

#[test]
fn cli_flags_override_defaults() {
    let _guard = lock_env();
    let config = Config::load_from_iter([
        OsString::from("wardend"),
        OsString::from("--log-filter"),
        OsString::from("debug"),
    ])
    .expect("cli flags load");
    assert_eq!(config.log_filter(), "debug");
}

#[test]
fn environment_overrides_defaults() {
    let _env = EnvOverride::set_var("WARDEN_SERVICE_NAME", OsStr::new("media-host"));
    let config = Config::load_from_iter([OsString::from("wardend")]).expect("env loads");
    assert_eq!(config.service_name, "media-host");
}

#[test]
fn service_switch_never_reaches_the_loader() {
    let _guard = lock_env();
    let options = StartupOptions::from_args(["wardend", "-service", "--log-format", "compact"]);
    let config = Config::load_for(&options).expect("startup switches are stripped");
    assert!(options.run_as_service());
    assert_eq!(config.log_format(), LogFormat::Compact);
}

//! Startup switches parsed from the raw process arguments.
//!
//! Startup switches decide how the process runs before any layered
//! configuration is read. They use the single-dash spelling service managers
//! have historically passed (`-service`), so they are stripped from the
//! argument list before it reaches the `ortho_config` loader.

use std::env;
use std::ffi::{OsStr, OsString};

/// Switch selecting service mode.
pub const SERVICE_SWITCH: &str = "-service";

const STARTUP_SWITCHES: &[&str] = &[SERVICE_SWITCH, "--service"];

/// Immutable set of startup flags captured at process entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupOptions {
    program: OsString,
    arguments: Vec<OsString>,
    run_as_service: bool,
}

impl StartupOptions {
    /// Parses options from an argument iterator whose first element is the
    /// program name.
    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut iter = args.into_iter().map(Into::into);
        let program = iter
            .next()
            .unwrap_or_else(|| OsString::from(env!("CARGO_PKG_NAME")));
        let mut options = Self {
            program,
            arguments: iter.collect(),
            run_as_service: false,
        };
        options.run_as_service = STARTUP_SWITCHES
            .iter()
            .any(|switch| options.contains_option(switch));
        options
    }

    /// Parses options from the current process arguments.
    pub fn from_env() -> Self {
        Self::from_args(env::args_os())
    }

    /// Whether the process was asked to run under a service manager.
    #[must_use]
    pub fn run_as_service(&self) -> bool {
        self.run_as_service
    }

    /// Case-insensitive check for an exact argument.
    #[must_use]
    pub fn contains_option(&self, option: &str) -> bool {
        self.arguments
            .iter()
            .any(|argument| matches_option(argument, option))
    }

    /// Arguments after the program name, exactly as received.
    ///
    /// Self-restart relaunches the executable with these.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.arguments
    }

    /// Program name followed by every argument that is not a startup switch.
    #[must_use]
    pub fn config_arguments(&self) -> Vec<OsString> {
        std::iter::once(self.program.clone())
            .chain(
                self.arguments
                    .iter()
                    .filter(|argument| !is_startup_switch(argument))
                    .cloned(),
            )
            .collect()
    }
}

fn matches_option(argument: &OsStr, option: &str) -> bool {
    argument
        .to_str()
        .is_some_and(|text| text.eq_ignore_ascii_case(option))
}

fn is_startup_switch(argument: &OsStr) -> bool {
    STARTUP_SWITCHES
        .iter()
        .any(|switch| matches_option(argument, switch))
}

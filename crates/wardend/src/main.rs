use std::process::ExitCode;

fn main() -> ExitCode {
    wardend::run_supervisor()
}

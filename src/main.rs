use std::process::ExitCode;

fn main() -> ExitCode {
    mono_rs::run_cli()
}

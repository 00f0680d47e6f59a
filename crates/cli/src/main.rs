use std::process::ExitCode;

fn main() -> ExitCode {
    gatebell_cli::run()
}

use std::process::ExitCode;

fn main() -> ExitCode {
    famcal_cli::run()
}

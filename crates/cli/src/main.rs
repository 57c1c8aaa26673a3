use std::process::ExitCode;

fn main() -> ExitCode {
    cartly_cli::run()
}

use std::process::ExitCode;

fn main() -> ExitCode {
    cils_cli::run()
}

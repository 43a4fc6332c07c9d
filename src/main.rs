use std::process::ExitCode;

use stisim::runner::run_with_args;

fn main() -> ExitCode {
    match run_with_args(|_, _| Ok(())) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

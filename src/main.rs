use std::process::ExitCode;

fn main() -> ExitCode {
    match payroll_calculator_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

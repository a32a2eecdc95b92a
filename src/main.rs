fn main() {
    if let Err(err) = clouddiet::cli::run() {
        clouddiet::ui::eprintln_error(&err);
        std::process::exit(clouddiet::exit::exit_code(&err));
    }
}

//! trec - command-line entry point

fn main() {
    if let Err(err) = triage_recover::cli::run() {
        triage_recover::ui::output::error(format!("{:#}", err));
        std::process::exit(1);
    }
}

use clap::Parser;
use stepexec::cli::{self, Cli};
use stepexec::logging;

fn main() {
    let args = Cli::parse();

    if let Err(err) = logging::init_logging(args.effective_log_level()) {
        eprintln!("stepexec error: {err:?}");
        std::process::exit(1);
    }

    match cli::run(args) {
        Ok(status) => std::process::exit(status),
        Err(err) => {
            eprintln!("stepexec error: {err:?}");
            std::process::exit(1);
        }
    }
}

use fatpipe_core::logging;

mod cli;

#[tokio::main]
async fn main() {
    // Initialize logging as early as possible; stdout is reserved for data.
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = cli::run_from_args().await {
        eprintln!("fatpipe error: {:#}", err);
        std::process::exit(1);
    }
}

use amiage::cli::{self, CheckAmiArgs};
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CheckAmiArgs::parse();
    cli::init_tracing(args.common.verbose);

    match cli::run_check_ami(args).await {
        Ok(code) => code,
        Err(e) => {
            cli::print_error(&e);
            ExitCode::FAILURE
        }
    }
}

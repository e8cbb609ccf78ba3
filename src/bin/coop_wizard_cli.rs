use std::process;

use coop_wizard::cli::{self, output};

#[tokio::main]
async fn main() {
    if let Err(err) = cli::run_cli().await {
        output::error(format!("{}", err));
        process::exit(1);
    }
}

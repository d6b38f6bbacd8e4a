use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    souk_cli::run().await
}

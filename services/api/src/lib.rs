mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use beneficiary_fraud::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}

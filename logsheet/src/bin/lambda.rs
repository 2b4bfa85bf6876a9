use lambda_runtime::{service_fn, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    logsheet::init_tracing();

    lambda_runtime::run(service_fn(logsheet::lambda::handler)).await
}

use hemmer_provider_newrelic::{init_logging, serve, NewRelicProvider, ProviderError};

#[tokio::main]
async fn main() -> Result<(), ProviderError> {
    init_logging();
    serve(NewRelicProvider::new()).await
}

//! Function-per-invocation entry point.
//!
//! The runtime keeps the process alive between invocations, so the store
//! connection cached in `AppState` is reused until the host freezes or
//! recycles the process.

use lambda_http::{Error, run};
use parcel_service::{AppConfig, AppState, build_router, telemetry};

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init_tracing();

    let config = AppConfig::from_env()?;
    let app = build_router(AppState::from_config(config));

    run(app).await
}

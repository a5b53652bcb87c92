//! Basic gateway demo: rate limiting plus retry around a flaky backend.
//!
//! Run with:
//! ```
//! cargo run --example basic_gateway
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use gatekit::{
    default_registry, BackendError, FnBackend, Gateway, GatewayConfig, GatewayRequest,
    GatewayResponse,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The chain configuration a config loader would normally produce.
    let config: GatewayConfig = serde_json::from_str(
        r#"{
            "globalPolicies": {
                "inbound": [{"rate_limit": {"requests_per_minute_per_ip": 5}}],
                "onError": [{"retry": {"max_attempts": 3, "backoff_seconds": 0.1}}]
            }
        }"#,
    )?;

    let gateway = Gateway::from_config(&config, &default_registry())?;

    // A backend that fails every third call.
    let calls = Arc::new(AtomicU32::new(0));
    let backend = Arc::new(FnBackend::new(move |request: GatewayRequest| {
        let calls = calls.clone();
        async move {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call % 3 == 0 {
                Err(BackendError::Unavailable("transient outage".into()).into())
            } else {
                Ok(GatewayResponse::ok(format!("hello from {}", request.path())))
            }
        }
    }));

    println!("=== Gateway Demo ===\n");
    println!("Quota: 5 requests/minute per IP, retry: 3 attempts\n");

    for i in 1..=8 {
        let request = GatewayRequest::new("GET", "/api/orders")
            .with_client_ip("203.0.113.9".parse().unwrap());

        match gateway.begin(backend.clone()).run(request).await {
            Ok(response) if response.status() == 200 => {
                println!("Request {}: allowed ({})", i, response.body());
            }
            Ok(response) => {
                println!(
                    "Request {}: {} {} (retry-after: {})",
                    i,
                    response.status(),
                    response.body(),
                    response.header("retry-after").unwrap_or("-")
                );
            }
            Err(err) => {
                println!("Request {}: failed ({err})", i);
            }
        }
    }

    Ok(())
}

//! Example demonstrating ceremony tracing instrumentation.
//!
//! Registers a software authenticator, logs in twice, then replays a stale
//! counter so the rejection path shows up in the logs.
//!
//! Run with: cargo run -p keygate-core --example ceremony_tracing

use std::sync::Arc;

use keygate_core::{MemoryStore, RelyingParty, RelyingPartyConfig, SoftAuthenticator};
use tracing_subscriber::{fmt, EnvFilter};

const RP_ID: &str = "localhost";
const ORIGIN: &str = "http://localhost:10001";

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with debug level
    fmt()
        .with_env_filter(EnvFilter::new("keygate_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== Keygate Ceremony Tracing Demo ===\n");

    let config = match RelyingPartyConfig::new(RP_ID, "Keygate Demo", ORIGIN) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };
    let store = Arc::new(MemoryStore::with_users([("1234", "Test")]));
    let rp = RelyingParty::new(config, store.clone());
    let mut authenticator = SoftAuthenticator::es256(RP_ID, ORIGIN);

    println!("Registering...\n");
    let options = match rp.begin_registration("1234").await {
        Ok(options) => options,
        Err(e) => {
            println!("\nRegistration failed: {}", e);
            return;
        }
    };
    let response = match authenticator.register(&options) {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Could not build attestation: {}", e);
            return;
        }
    };
    let registered = rp.complete_registration("1234", &response).await;
    match registered {
        Ok(outcome) => println!(
            "\nRegistered {} credential ({} bytes id)\n",
            outcome.authenticator.algorithm,
            outcome.authenticator.credential_id.len()
        ),
        Err(e) => {
            println!("\nRegistration failed: {}", e);
            return;
        }
    }

    for attempt in 1..=3 {
        if attempt == 3 {
            // Simulate a cloned authenticator replaying an old counter
            authenticator.set_counter(0);
        }
        let result = match rp.begin_authentication("1234").await {
            Ok(options) => {
                rp.complete_authentication("1234", &authenticator.authenticate(&options))
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(outcome) => println!("\nLogin {}: counter now {}\n", attempt, outcome.new_counter),
            Err(e) => println!("\nLogin {} rejected: {}\n", attempt, e),
        }
    }

    println!("Store: {:?}", store.stats());
}

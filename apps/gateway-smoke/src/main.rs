use std::{env, sync::Arc};

use client_gateway::{GatewayConfig, spawn_runtime};
use client_platform::InMemoryTokenStore;

#[tokio::main]
async fn main() {
    let endpoint =
        env::var("TERNCHAT_ENDPOINT").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_owned());

    let _handle = spawn_runtime(
        GatewayConfig::new(endpoint.clone()),
        Arc::new(InMemoryTokenStore::default()),
    );

    println!("Client runtime initialized for {endpoint}.");
    println!("Set TERNCHAT_TOKEN and run ternchat-cli for a live session.");
}

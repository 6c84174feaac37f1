//! Simple example of using proxied-reqwest.

use proxied_reqwest::{ClientConfig, RequestOptions};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Initializing proxy pool...");

    let config = ClientConfig::builder()
        // free socks5 proxy list, one `ip:port` per line
        .proxy_url("https://cdn.jsdelivr.net/gh/dpangestuw/Free-Proxy@main/socks5_proxies.txt")
        .retries(5)
        .timeout(Duration::from_secs(5))
        .refresh_interval(Duration::from_secs(60 * 60))
        .build();

    let client = proxied_reqwest::get_or_create(config);
    client.ready().await?;
    println!("Loaded {} proxies", client.pool().len());

    println!("Sending request...");
    let response = client.get("https://httpbin.org/ip", RequestOptions::new()).await?;

    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);

    Ok(())
}

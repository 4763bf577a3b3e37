// demos/negotiate_ad.rs

//! Calls an Active Directory protected HTTP API with Negotiate
//! authentication.
//!
//! # Usage
//!
//! ## GET as the current user (Kerberos):
//! ```bash
//! cargo run --example negotiate_ad -- https://hyperv.corp.com/api/vms
//! ```
//!
//! ## POST a JSON body:
//! ```bash
//! cargo run --example negotiate_ad -- https://hyperv.corp.com/api/vms --post --body '{"name":"vm01"}'
//! ```
//!
//! ## Impersonate another account for the request:
//! ```bash
//! cargo run --example negotiate_ad -- https://hyperv.corp.com/api/vms --username CORP\\svc-hyperv --password pass
//! ```
//!
//! Set `RUST_LOG=negotiate_http=debug` to see every authentication leg.

use http::{header, Method, Request};
use http_body_util::BodyExt;
use negotiate_http::{Body, Client, Proxy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: negotiate_ad <url> [OPTIONS]");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --username <user>    Account to impersonate (DOMAIN\\user or user@REALM)");
        eprintln!("  --password <pass>    Password of that account");
        eprintln!("  --post               Send a POST request instead of GET");
        eprintln!("  --body <json>        JSON body for POST (default: {{}})");
        eprintln!("  --timeout <secs>     Whole-request timeout (default: 300)");
        eprintln!("  --proxy <url>        HTTP proxy to route the request through");
        std::process::exit(1);
    }

    let url = &args[1];
    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let use_post = args.iter().any(|a| a == "--post");
    let username = flag("--username");
    let password = flag("--password");
    let body = flag("--body").unwrap_or_else(|| "{}".to_owned());
    let timeout = flag("--timeout").map(|s| s.parse::<u64>()).transpose()?;
    let proxy = flag("--proxy");

    println!("=== Negotiate Authentication Example ===");
    println!("URL: {}", url);
    if !negotiate_http::auth::platform::NATIVE {
        println!("Note: no native security subsystem, requests are sent unauthenticated");
    }

    let mut builder = Client::builder().log_http(true);
    if let Some(secs) = timeout {
        builder = builder.timeout(std::time::Duration::from_secs(secs));
    }
    if let Some(proxy) = proxy {
        println!("Proxy: {}", proxy);
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    let client = match (username, password) {
        (Some(user), Some(pass)) => {
            println!("Mode: impersonating {}", user);
            builder.negotiate_with_credentials(user, pass).build()?
        }
        _ => {
            println!("Mode: current user");
            builder.negotiate().build()?
        }
    };

    let resp = if use_post {
        println!("\nSending POST request...");
        println!("Body: {}", body);

        let request = Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))?;
        client.execute(request).await?
    } else {
        println!("\nSending GET request...");
        client.get(url).await?
    };

    println!("\n=== Response ===");
    println!("Status: {}", resp.status());
    println!("\nHeaders:");
    for (name, value) in resp.headers() {
        println!("  {}: {:?}", name, value);
    }

    let bytes = resp.into_body().collect().await?.to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    println!("\nBody ({} bytes):", bytes.len());
    if text.len() <= 1000 {
        println!("{}", text);
    } else {
        let cut = (0..=1000).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
        println!("{}... (truncated)", &text[..cut]);
    }

    Ok(())
}

//! Check command - runs requests through the Digest handshake directly
//! against the printer, without starting the proxy.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use reqwest::Method;
use serde::Serialize;

use kiosk_auth::{
    Credentials, DigestOrchestrator, NonceCache, Outcome, Passthrough, ProxyRequest,
};
use kiosk_config::KioskConfig;

use super::{Context, UpstreamArgs};

/// Longest body printed without --verbose.
const BODY_PREVIEW_LIMIT: usize = 2000;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path and query to request on the printer
    #[arg(default_value = "/api/version")]
    pub path: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Send the request this many times, reusing the cached nonce
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub count: u32,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}

/// One attempt for JSON output.
#[derive(Debug, Serialize)]
struct AttemptOutput {
    attempt: u32,
    status: u16,
    handshake: &'static str,
    upstream_calls: u8,
    body: String,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let mut overrides = KioskConfig::new();
    args.upstream.apply(&mut overrides);
    let settings = super::load_settings(ctx, overrides)?;

    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", args.method))?;
    let uri = if args.path.starts_with('/') {
        args.path.clone()
    } else {
        format!("/{}", args.path)
    };

    let passthrough = Passthrough::with_config(super::passthrough_config(&settings))?;
    let orchestrator = DigestOrchestrator::new(
        Arc::new(passthrough),
        Arc::new(NonceCache::new()),
        Credentials::new(&settings.username, &settings.password),
    );

    if !ctx.json_output {
        println!();
        println!("{}", style("PrusaLink Digest Check").bold());
        println!("{}", Style::new().dim().apply_to("─".repeat(40)));
        println!();
    }

    let request = ProxyRequest::new(method.clone(), uri.as_str());
    for attempt in 1..=args.count {
        let outcome = orchestrator
            .execute(&request)
            .await
            .with_context(|| format!("{} {}{} failed", method, settings.origin, uri))?;

        if ctx.json_output {
            let output = AttemptOutput {
                attempt,
                status: outcome.response.status.as_u16(),
                handshake: outcome.path.as_str(),
                upstream_calls: outcome.upstream_calls,
                body: String::from_utf8_lossy(&outcome.response.body).into_owned(),
            };
            println!("{}", serde_json::to_string(&output)?);
        } else {
            print_attempt(attempt, &outcome, ctx.verbose);
        }
    }

    Ok(())
}

fn print_attempt(attempt: u32, outcome: &Outcome, verbose: bool) {
    let dim = Style::new().dim();
    let status = outcome.response.status;
    let status_style = if status.is_success() {
        Style::new().green()
    } else {
        Style::new().yellow()
    };

    println!(
        "  {} {}  {} {}  {} {}",
        dim.apply_to(format!("#{}", attempt)),
        status_style.apply_to(status),
        dim.apply_to("handshake:"),
        outcome.path.as_str(),
        dim.apply_to("upstream calls:"),
        outcome.upstream_calls
    );

    let body = String::from_utf8_lossy(&outcome.response.body);
    if body.is_empty() {
        println!();
        return;
    }
    if verbose || body.len() <= BODY_PREVIEW_LIMIT {
        println!("{}", body);
    } else {
        let cut = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= BODY_PREVIEW_LIMIT)
            .last()
            .unwrap_or(0);
        println!("{}", &body[..cut]);
        println!(
            "{}",
            dim.apply_to(format!("… {} more bytes (use --verbose)", body.len() - cut))
        );
    }
    println!();
}

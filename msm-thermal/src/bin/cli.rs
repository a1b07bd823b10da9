//! Command-line interface for msm-thermald.
//!
//! Reads controller status and inspects or changes the thermal
//! configuration through the daemon's HTTP API.

use std::env;

use anyhow::{Context, Result};

use msm_thermal::api_client::{self, types::ConfigPatchRequest};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let command = &args[1];

    match (command.as_str(), &args[2..]) {
        ("status", []) => cmd_status().await?,
        ("config", []) => cmd_config().await?,
        ("get", [key]) => cmd_get(key).await?,
        ("set", [key, value]) => cmd_set(key, value).await?,
        ("patch", pairs) if !pairs.is_empty() => cmd_patch(pairs).await?,
        _ => {
            eprintln!("Unknown command or wrong arguments: {}", args[1..].join(" "));
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn usage() {
    eprintln!("Usage: msm-thermal-cli <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status             Show throttle phase, temperature and ceilings");
    eprintln!("  config             Show the full thermal configuration");
    eprintln!("  get <key>          Show one configuration value");
    eprintln!("  set <key> <value>  Change one configuration value");
    eprintln!("  patch <key=value>...");
    eprintln!("                     Change several values in one atomic update");
    eprintln!();
    eprintln!("Environment:");
    eprintln!(
        "  MSM_THERMAL_API_URL    API base URL (default: {})",
        api_client::DEFAULT_BASE_URL
    );
}

/// Build an API client, honoring MSM_THERMAL_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("MSM_THERMAL_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

async fn cmd_status() -> Result<()> {
    let client = make_client();
    let status = client.get_status().await?;

    println!("Phase:       {}", status.phase);
    match status.temperature_c {
        Some(temp) => println!("Temperature: {temp} C"),
        None => println!("Temperature: (unknown)"),
    }
    println!("Next poll:   {} ms", status.next_poll_ms);

    if status.sensor_failures > 0 {
        println!("Sensor failures: {}", status.sensor_failures);
    }
    if status.shutdown_triggered {
        println!("Critical shutdown triggered");
    }

    if status.ceilings.is_empty() {
        println!("Ceilings:    (none applied)");
    } else {
        println!("Ceilings:");
        for ceiling in &status.ceilings {
            println!("  cpu{}: {} kHz", ceiling.cpu, ceiling.khz);
        }
    }

    Ok(())
}

async fn cmd_config() -> Result<()> {
    let client = make_client();
    let config = client.get_config().await?;

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn cmd_get(key: &str) -> Result<()> {
    let client = make_client();
    let value = client.get_value(key).await?;

    println!("{} = {}", value.key, value.value);
    Ok(())
}

async fn cmd_set(key: &str, value: &str) -> Result<()> {
    let value = parse_value(value)?;

    let client = make_client();
    let updated = client.set_value(key, value).await?;

    println!("{} = {}", updated.key, updated.value);
    Ok(())
}

async fn cmd_patch(pairs: &[String]) -> Result<()> {
    let mut patch = ConfigPatchRequest::default();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got {pair:?}"))?;
        patch.values.insert(key.to_string(), parse_value(value)?);
    }

    let client = make_client();
    let config = client.patch_config(&patch).await?;

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn parse_value(value: &str) -> Result<i64> {
    value
        .parse()
        .with_context(|| format!("not an integer: {value:?}"))
}

//! Mock infrastructure tool for integration testing
//!
//! Implements just enough of the terraform command-line contract (init,
//! validate, plan, apply, destroy) to exercise plancheck without a real tool
//! or cloud account. Behavior is steered through environment variables:
//!
//! - `MOCK_TF_FAIL`: comma-separated subcommands that exit 1
//! - `MOCK_TF_THROTTLE`: number of initial plan runs that fail with a
//!   throttling error
//! - `MOCK_TF_SLEEP_SECS`: seconds every plan run sleeps first
//! - `MOCK_TF_DESTROY_LOG`: file that gets one line appended per destroy
//!
//! Plan output is the module's `plan.txt`, followed by one line per `-var`.

use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::exit;
use std::time::Duration;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(subcommand) = args.first().map(String::as_str) else {
        eprintln!("Usage: mock-terraform <init|validate|plan|apply|destroy> [options]");
        exit(127);
    };

    if should_fail(subcommand) {
        println!("Error: mock {} failure", subcommand);
        exit(1);
    }

    let code = match subcommand {
        "init" => init(&args[1..]),
        "validate" => validate(),
        "plan" => plan(&args[1..]),
        "apply" => apply(),
        "destroy" => destroy(),
        other => {
            eprintln!("Error: unknown command \"{}\"", other);
            127
        }
    };
    exit(code);
}

fn should_fail(subcommand: &str) -> bool {
    std::env::var("MOCK_TF_FAIL")
        .map(|v| v.split(',').any(|s| s.trim() == subcommand))
        .unwrap_or(false)
}

fn initialized() -> bool {
    Path::new(".terraform").is_dir()
}

fn init(args: &[String]) -> i32 {
    let backend: Vec<&str> = args
        .iter()
        .filter_map(|a| a.strip_prefix("-backend-config="))
        .collect();
    let state = json!({
        "version": 3,
        "backend": { "type": "local", "config": backend },
    });

    if let Err(e) = fs::create_dir_all(".terraform").and_then(|_| {
        fs::write(".terraform/terraform.tfstate", state.to_string())
    }) {
        println!("Error: failed to initialize backend: {}", e);
        return 1;
    }

    println!("Initializing the backend...");
    println!("Initializing provider plugins...");
    println!();
    println!("Terraform has been successfully initialized!");
    0
}

fn validate() -> i32 {
    if !initialized() {
        println!("Error: Missing required provider");
        return 1;
    }
    println!("Success! The configuration is valid.");
    0
}

fn plan(args: &[String]) -> i32 {
    if !initialized() {
        println!("Error: Backend initialization required, please run \"terraform init\"");
        return 1;
    }

    if let Some(secs) = std::env::var("MOCK_TF_SLEEP_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
    {
        std::thread::sleep(Duration::from_secs(secs));
    }

    if throttled() {
        eprintln!("Error: reading EC2 VPCs: RequestLimitExceeded: Request limit exceeded.");
        return 1;
    }

    let body = fs::read_to_string("plan.txt").unwrap_or_default();
    println!("Terraform will perform the following actions:");
    println!();
    print!("{}", body);

    let vars: Vec<&String> = args
        .iter()
        .zip(args.iter().skip(1))
        .filter(|(flag, _)| *flag == "-var")
        .map(|(_, value)| value)
        .collect();
    if !vars.is_empty() {
        println!();
        println!("Input variables:");
        for var in vars {
            println!("  var.{}", var);
        }
    }

    let adds = body.matches("will be created").count();
    println!();
    println!("Plan: {} to add, 0 to change, 0 to destroy.", adds);
    0
}

/// Fail the first `MOCK_TF_THROTTLE` plan runs in this directory
fn throttled() -> bool {
    let limit: u32 = std::env::var("MOCK_TF_THROTTLE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let counter = Path::new(".terraform/mock-throttle");
    let seen: u32 = fs::read_to_string(counter)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);
    if seen < limit {
        let _ = fs::write(counter, (seen + 1).to_string());
        return true;
    }
    false
}

fn apply() -> i32 {
    if !initialized() {
        println!("Error: Backend initialization required, please run \"terraform init\"");
        return 1;
    }
    let state = json!({ "version": 4, "serial": 1, "resources": [] });
    if let Err(e) = fs::write("terraform.tfstate", state.to_string()) {
        println!("Error: failed to persist state: {}", e);
        return 1;
    }
    println!("Apply complete! Resources: 2 added, 0 changed, 0 destroyed.");
    0
}

fn destroy() -> i32 {
    let _ = fs::remove_file("terraform.tfstate");
    if let Ok(log) = std::env::var("MOCK_TF_DESTROY_LOG") {
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        if let Ok(mut f) = fs::OpenOptions::new().create(true).append(true).open(log) {
            let _ = writeln!(f, "{}", cwd);
        }
    }
    println!("Destroy complete! Resources: 2 destroyed.");
    0
}

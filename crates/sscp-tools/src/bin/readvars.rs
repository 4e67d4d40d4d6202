use clap::Parser;
use sscp_tools::common::{init_tracing, load_variables, login, resolve_variables, ConnectionArgs};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "readvars", about = "Read PLC variables")]
struct Args {
    #[command(flatten)]
    conn: ConnectionArgs,
    /// Variables as uid-offset-length[:type]. Reads every file variable when omitted.
    #[arg(long = "var")]
    vars: Vec<String>,
    /// JSON file with variable definitions (names, states, ranges).
    #[arg(long)]
    vars_file: Option<PathBuf>,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let defined = match &args.vars_file {
        Some(path) => load_variables(path)?,
        None => Vec::new(),
    };
    let variables = if args.vars.is_empty() {
        defined
    } else {
        resolve_variables(&args.vars, &defined)?
    };
    if variables.is_empty() {
        return Err("no variables given (use --var or --vars-file)".into());
    }

    let mut client = login(&args.conn).await?;
    let outcome = client.read_variables(&variables).await?;
    client.logout().await;

    if args.json {
        let values: serde_json::Map<String, serde_json::Value> = variables
            .iter()
            .zip(&outcome.readings)
            .filter_map(|(var, reading)| {
                reading
                    .as_ref()
                    .map(|r| (var.key(), serde_json::json!(var.describe(&r.value))))
            })
            .collect();
        let errors: Vec<_> = outcome
            .errors
            .iter()
            .map(|e| serde_json::json!({ "uid": e.uid, "code": e.code.to_string() }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "values": values, "errors": errors }))?
        );
        return Ok(());
    }

    for (var, reading) in variables.iter().zip(&outcome.readings) {
        let Some(reading) = reading else {
            continue;
        };
        let label = var.name.as_deref().unwrap_or("");
        println!("{:<16} {:<24} {}", var.key(), label, var.describe(&reading.value));
    }
    for error in &outcome.errors {
        eprintln!("uid {} failed: {}", error.uid, error.code);
    }
    Ok(())
}

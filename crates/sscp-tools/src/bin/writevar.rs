use clap::Parser;
use sscp_core::variable::{NewValue, Permission};
use sscp_tools::common::{init_tracing, load_variables, login, resolve_variables, ConnectionArgs};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "writevar", about = "Write one PLC variable")]
struct Args {
    #[command(flatten)]
    conn: ConnectionArgs,
    /// Variable as uid-offset-length[:type].
    #[arg(long = "var")]
    var: String,
    /// New value: a number, a state label, `+` or `-`.
    #[arg(long, allow_hyphen_values = true)]
    value: String,
    /// JSON file with variable definitions (states, ranges, step).
    #[arg(long)]
    vars_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let defined = match &args.vars_file {
        Some(path) => load_variables(path)?,
        None => Vec::new(),
    };
    let mut variable = resolve_variables(std::slice::from_ref(&args.var), &defined)?
        .pop()
        .ok_or("no variable given")?;
    if !defined.iter().any(|var| var.address() == variable.address()) {
        // Bare addresses carry no permission; the PLC enforces its own.
        variable.perm = Permission::ReadWrite;
    }
    let new = NewValue::from(args.value.as_str());

    let mut client = login(&args.conn).await?;
    let before = client.read_variables(std::slice::from_ref(&variable)).await?;
    let previous = before.readings[0].as_ref().map(|r| r.value.clone());
    if let Some(previous) = &previous {
        println!("{} was {}", variable.key(), variable.describe(previous));
    }

    let written = client
        .write_variable(&variable, &new, previous.as_ref())
        .await?;
    println!("wrote {:02X?}", written);

    let after = client.read_variables(std::slice::from_ref(&variable)).await?;
    if let Some(reading) = &after.readings[0] {
        println!("{} is {}", variable.key(), variable.describe(&reading.value));
    }
    client.logout().await;
    Ok(())
}

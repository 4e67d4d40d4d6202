use clap::{Parser, Subcommand, ValueEnum};
use sscp_core::schedule::{local_now, Schedule, ScheduleKind};
use sscp_core::variable::{NewValue, Permission, VarType};
use sscp_tools::common::{init_tracing, login, parse_datetime, parse_variable, ConnectionArgs};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Base,
    Exceptions,
}

impl From<Kind> for ScheduleKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Base => ScheduleKind::Base,
            Kind::Exceptions => ScheduleKind::Exceptions,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Print transitions and events.
    List,
    /// Add an interval.
    Add {
        #[arg(long, value_parser = parse_datetime)]
        start: chrono::NaiveDateTime,
        #[arg(long, value_parser = parse_datetime)]
        end: chrono::NaiveDateTime,
        #[arg(long)]
        off: bool,
    },
    /// Remove an interval.
    Remove {
        #[arg(long, value_parser = parse_datetime)]
        start: chrono::NaiveDateTime,
        #[arg(long, value_parser = parse_datetime)]
        end: chrono::NaiveDateTime,
        #[arg(long)]
        off: bool,
    },
}

#[derive(Debug, Parser)]
#[command(name = "schedule", about = "Show or edit a PLC schedule block")]
struct Args {
    #[command(flatten)]
    conn: ConnectionArgs,
    /// Schedule block as uid-offset-length.
    #[arg(long = "var")]
    var: String,
    #[arg(long, value_enum, default_value_t = Kind::Base)]
    kind: Kind,
    #[command(subcommand)]
    action: Action,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut variable = parse_variable(&args.var)?;
    variable.var_type = VarType::Schedule;
    variable.perm = Permission::ReadWrite;

    let mut client = login(&args.conn).await?;
    let outcome = client.read_variables(std::slice::from_ref(&variable)).await?;
    let Some(reading) = &outcome.readings[0] else {
        client.logout().await;
        return Err(format!("reading {} failed: {:?}", variable.key(), outcome.error_codes()).into());
    };
    let schedule = Schedule::decode(args.kind.into(), &variable, &reading.raw)?;
    let now = local_now();

    let block = match args.action {
        Action::List => {
            println!(
                "{} slots, on state {}",
                schedule.item_count(),
                schedule.on_state()
            );
            if let Schedule::Base(base) = &schedule {
                for (day, hour, minute, on) in base.transitions() {
                    println!("{day} {hour:02}:{minute:02} {}", if on { "on" } else { "off" });
                }
            }
            for event in schedule.to_events(now) {
                println!(
                    "[{}] {} - {} {}",
                    event.slot,
                    event.start.format("%Y-%m-%d %H:%M"),
                    event.end.format("%Y-%m-%d %H:%M"),
                    if event.on { "on" } else { "off" }
                );
            }
            None
        }
        Action::Add { start, end, off } => Some(schedule.add_event(start, end, !off, now)?),
        Action::Remove { start, end, off } => Some(schedule.remove_event(start, end, !off, now)?),
    };

    if let Some(block) = block {
        client
            .write_variable(&variable, &NewValue::Raw(block), None)
            .await?;
        println!("schedule {} updated", variable.key());
    }
    client.logout().await;
    Ok(())
}

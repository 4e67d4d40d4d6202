use chrono::NaiveDateTime;
use clap::{ArgGroup, Args};
use sscp_client::{ClientConfig, ClientError, Credentials, SscpClient};
use sscp_core::variable::{VarType, Variable};
use sscp_datalink::{SscpTcpTransport, TransportConfig, DEFAULT_PORT};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("secret").required(true).args(["password", "md5"])))]
pub struct ConnectionArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// PLC sub-address placed in each request header.
    #[arg(long, default_value_t = 1)]
    pub sscp_address: u8,
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub password: Option<String>,
    /// Pre-computed MD5 digest of the password, 32 hex characters.
    #[arg(long)]
    pub md5: Option<String>,
    /// Reply timeout in seconds.
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

impl ConnectionArgs {
    pub fn credentials(&self) -> Result<Credentials, ClientError> {
        match (&self.password, &self.md5) {
            (_, Some(digest)) => Credentials::from_md5_hex(&self.username, digest),
            (Some(password), None) => Ok(Credentials::from_password(&self.username, password)),
            (None, None) => Ok(Credentials::from_password(&self.username, "")),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::default().with_data_timeout(Duration::from_secs(self.timeout))
    }
}

/// Open a TCP session without logging in.
pub async fn connect(args: &ConnectionArgs) -> Result<SscpClient<SscpTcpTransport>, ClientError> {
    let addr = format!("{}:{}", args.host, args.port);
    let config = ClientConfig::default().with_plc_address(args.sscp_address);
    debug!(%addr, user = %args.username, "connecting");
    SscpClient::connect_with_config(addr, args.credentials()?, config, args.transport_config())
        .await
}

/// Open a TCP session and log in.
pub async fn login(args: &ConnectionArgs) -> Result<SscpClient<SscpTcpTransport>, ClientError> {
    let mut client = connect(args).await?;
    client.login().await?;
    Ok(client)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// Parse `uid-offset-length[:type]`, e.g. `100-0-4:13`. The type tag
/// defaults to an opaque integer of the given length.
pub fn parse_variable(input: &str) -> Result<Variable, String> {
    let (address, tag) = match input.split_once(':') {
        Some((address, tag)) => (
            address,
            Some(
                tag.trim()
                    .parse::<u8>()
                    .map_err(|_| format!("invalid type tag in {input}"))?,
            ),
        ),
        None => (input, None),
    };
    let parts: Vec<u32> = address
        .split('-')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("invalid variable address: {input}"))?;
    let &[uid, offset, length] = parts.as_slice() else {
        return Err(format!("expected uid-offset-length, got {input}"));
    };
    let var_type = match tag {
        Some(tag) => VarType::from_tag(tag),
        None if length == 1 => VarType::Bool,
        None if length == 2 => VarType::Int16,
        None => VarType::Int64,
    };
    Ok(Variable::new(uid, offset, length, var_type))
}

/// Load variable definitions from a JSON array as exported for the PLC.
pub fn load_variables(path: &Path) -> Result<Vec<Variable>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Pick definitions for `keys` from `defined`, falling back to the bare
/// address form when a key is not defined.
pub fn resolve_variables(keys: &[String], defined: &[Variable]) -> Result<Vec<Variable>, String> {
    keys.iter()
        .map(|key| {
            let bare = parse_variable(key)?;
            Ok(defined
                .iter()
                .find(|var| var.address() == bare.address())
                .cloned()
                .unwrap_or(bare))
        })
        .collect()
}

pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(input.trim(), "%Y-%m-%d %H:%M")
        .map_err(|err| format!("invalid date/time {input:?} (expected YYYY-MM-DD HH:MM): {err}"))
}

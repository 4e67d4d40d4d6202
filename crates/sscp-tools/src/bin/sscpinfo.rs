use clap::Parser;
use sscp_tools::common::{connect, init_tracing, ConnectionArgs};

#[derive(Debug, Parser)]
#[command(name = "sscpinfo", about = "Show PLC identity and login parameters")]
struct Args {
    #[command(flatten)]
    conn: ConnectionArgs,
    /// Skip the login handshake and only query device info.
    #[arg(long)]
    no_login: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut client = connect(&args.conn).await?;

    let info = client.get_info(true).await?;
    println!("serial:          {}", info.serial_hex());
    println!("endianness:      {}", info.endianness);
    println!(
        "platform id:     {:02X}{:02X}{:02X}{:02X}",
        info.platform_id[0], info.platform_id[1], info.platform_id[2], info.platform_id[3]
    );
    println!("runtime version: {}", info.runtime_version);
    if !info.information.is_empty() {
        println!("information:     {:02X?}", info.information);
    }

    if !args.no_login {
        let session = client.login().await?;
        println!("protocol:        {}", session.protocol_version);
        println!("max data:        {}", session.max_data);
        println!("group:           {}", session.group);
        println!("image guid:      {}", session.image_guid_hex());
        client.logout().await;
    }
    Ok(())
}

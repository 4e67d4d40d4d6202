use sscp_client::{Credentials, SscpClient};
use sscp_core::variable::{VarType, Variable};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let credentials = Credentials::from_password("admin", "rw");
    let mut client = SscpClient::connect("127.0.0.1:12346", credentials).await?;
    client.login().await?;

    let variables = vec![
        Variable::new(100, 0, 4, VarType::Float32),
        Variable::new(200, 0, 1, VarType::Bool),
    ];
    let outcome = client.read_variables(&variables).await?;
    for (key, value) in outcome.values(&variables) {
        println!("{key}: {value}");
    }
    for error in &outcome.errors {
        println!("{}: {}", error.uid, error.code);
    }

    client.logout().await;
    Ok(())
}

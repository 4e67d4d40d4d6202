use md5::{Digest, Md5};
use sscp_core::encoding::Writer;
use sscp_core::pdu::{FunctionCode, InfoRequest, Request};
use sscp_datalink::{DataLink, InMemorySscpService, SscpTcpServer, SscpTcpTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let service = std::sync::Arc::new(
        InMemorySscpService::new()
            .with_user("admin", "rw", 1)
            .with_block(100, vec![0x41, 0xAC, 0x00, 0x00]),
    );

    let server = SscpTcpServer::bind("127.0.0.1:0", std::sync::Arc::clone(&service)).await?;
    let addr = server.local_addr()?;
    let server_task = tokio::spawn(server.run());

    let client = SscpTcpTransport::connect(addr).await?;

    let digest: [u8; 16] = Md5::digest(b"rw").into();
    let mut request = [0u8; 64];
    let mut w = Writer::new(&mut request);
    Request::GetInfo(InfoRequest {
        protocol_version: 1,
        serial_flag: 1,
        username: b"admin",
        digest: &digest,
        offset: 0,
        size: 0,
    })
    .encode(&mut w)?;
    let len = w.position();

    let mut response = [0u8; 2048];
    let reply = client
        .exchange(1, FunctionCode::GetInfo.as_u16(), &request[..len], &mut response)
        .await?;

    println!(
        "status {:#06x}, info: {:02X?}",
        reply.status,
        &response[..reply.len]
    );

    server_task.abort();
    let _ = server_task.await;
    Ok(())
}

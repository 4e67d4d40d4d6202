use sscp_core::encoding::{Reader, Writer};
use sscp_core::frame;
use sscp_core::pdu::{ReadDataRequest, Request};
use sscp_core::variable::{NewValue, State, VarType, Variable};

fn main() {
    let vars = [
        Variable::new(100, 0, 4, VarType::Float32)
            .writable()
            .with_range(Some(5.0), Some(35.0))
            .with_step(0.5),
        Variable::new(300, 0, 2, VarType::Int16)
            .writable()
            .with_states(vec![
                State::new(1, "Heat").with_next(2),
                State::new(2, "Cool").with_next(1),
            ]),
    ];

    let addresses: Vec<_> = vars.iter().map(Variable::address).collect();
    let mut data = [0u8; 64];
    let mut w = Writer::new(&mut data);
    Request::ReadData(ReadDataRequest {
        variables: &addresses,
    })
    .encode(&mut w)
    .expect("read request encoding should succeed for two variables");
    println!("read request data: {:02X?}", w.as_written());

    let reply = [0x01, 0x85, 0x00, 0x00, 0x06, 0x41, 0xA8, 0x00, 0x00, 0x00, 0x01];
    let mut r = Reader::new(&reply);
    let (_, payload) = frame::decode_reply(&mut r).expect("sample reply should decode");

    let mut offset = 0;
    for var in &vars {
        let len = var.length as usize;
        let value = var.decode(&payload[offset..offset + len]);
        offset += len;
        println!("{} = {}", var.key(), var.describe(&value));

        match var.encode(&NewValue::Increment, Some(&value)) {
            Ok(raw) => println!("  '+' writes {raw:02X?}"),
            Err(err) => println!("  '+' rejected: {err}"),
        }
    }
}

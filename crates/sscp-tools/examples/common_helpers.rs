use sscp_tools::common::{parse_datetime, parse_variable};

fn main() {
    for sample in ["100-0-4:13", "200-0-1", "300-0-2:2", "1-2"] {
        println!("{sample} => {:?}", parse_variable(sample).map(|v| v.key()));
    }
    println!("{:?}", parse_datetime("2024-05-13 08:30"));
}

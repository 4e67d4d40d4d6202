pub mod tcp;

pub use tcp::{
    decode_reply, decode_request, encode_reply, encode_request, ReplyHeader, RequestHeader,
    HEADER_LEN,
};

use crate::encoding::{Reader, Writer};
use crate::{DecodeError, EncodeError};

/// Both request and reply frames start with a fixed 5-byte header.
pub const HEADER_LEN: usize = 5;

/// `[1B PLC sub-address][2B function code][2B data length]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub address: u8,
    pub function: u16,
    pub length: u16,
}

impl RequestHeader {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(self.address)?;
        w.write_be_u16(self.function)?;
        w.write_be_u16(self.length)?;
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            address: r.read_u8()?,
            function: r.read_be_u16()?,
            length: r.read_be_u16()?,
        })
    }
}

/// `[1B echo][2B status][2B data length]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub echo: u8,
    pub status: u16,
    pub length: u16,
}

impl ReplyHeader {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(self.echo)?;
        w.write_be_u16(self.status)?;
        w.write_be_u16(self.length)?;
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            echo: r.read_u8()?,
            status: r.read_be_u16()?,
            length: r.read_be_u16()?,
        })
    }

    /// Total frame length implied by the header.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + usize::from(self.length)
    }
}

fn data_len(data: &[u8]) -> Result<u16, EncodeError> {
    data.len()
        .try_into()
        .map_err(|_| EncodeError::ValueOutOfRange)
}

pub fn encode_request(
    w: &mut Writer<'_>,
    address: u8,
    function: u16,
    data: &[u8],
) -> Result<(), EncodeError> {
    let header = RequestHeader {
        address,
        function,
        length: data_len(data)?,
    };
    header.encode(w)?;
    w.write_all(data)?;
    Ok(())
}

pub fn decode_request<'a>(r: &mut Reader<'a>) -> Result<(RequestHeader, &'a [u8]), DecodeError> {
    let header = RequestHeader::decode(r)?;
    let data = r.read_exact(usize::from(header.length))?;
    Ok((header, data))
}

pub fn encode_reply(
    w: &mut Writer<'_>,
    echo: u8,
    status: u16,
    data: &[u8],
) -> Result<(), EncodeError> {
    let header = ReplyHeader {
        echo,
        status,
        length: data_len(data)?,
    };
    header.encode(w)?;
    w.write_all(data)?;
    Ok(())
}

pub fn decode_reply<'a>(r: &mut Reader<'a>) -> Result<(ReplyHeader, &'a [u8]), DecodeError> {
    let header = ReplyHeader::decode(r)?;
    let data = r.read_exact(usize::from(header.length))?;
    Ok((header, data))
}

use crate::encoding::{Reader, Writer};
use crate::{DecodeError, EncodeError};

pub const IMAGE_GUID_LEN: usize = 16;

/// Login reply: `[1B version][2B max data][1B group][16B GUID][optional]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginResponse<'a> {
    pub protocol_version: u8,
    /// Largest request data length the PLC accepts.
    pub max_data: u16,
    /// Rights group of the logged-in user.
    pub group: u8,
    pub image_guid: [u8; IMAGE_GUID_LEN],
    pub optional: &'a [u8],
}

impl<'a> LoginResponse<'a> {
    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let protocol_version = r.read_u8()?;
        let max_data = r.read_be_u16()?;
        let group = r.read_u8()?;
        let image_guid = r.read_array()?;
        let optional = r.read_exact(r.remaining())?;
        Ok(Self {
            protocol_version,
            max_data,
            group,
            image_guid,
            optional,
        })
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(self.protocol_version)?;
        w.write_be_u16(self.max_data)?;
        w.write_u8(self.group)?;
        w.write_all(&self.image_guid)?;
        w.write_all(self.optional)?;
        Ok(())
    }
}

/// Info reply.
///
/// `[2B reserved][1B serial len][serial][1B endianness][4B platform id]
/// [1B version len][version][optional information]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoResponse<'a> {
    pub reserved: u16,
    pub serial: &'a [u8],
    pub endianness: u8,
    pub platform_id: [u8; 4],
    pub runtime_version: &'a [u8],
    pub information: &'a [u8],
}

impl<'a> InfoResponse<'a> {
    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let reserved = r.read_be_u16()?;
        let serial = r.read_len_prefixed()?;
        let endianness = r.read_u8()?;
        let platform_id = r.read_array()?;
        let runtime_version = r.read_len_prefixed()?;
        let information = r.read_exact(r.remaining())?;
        Ok(Self {
            reserved,
            serial,
            endianness,
            platform_id,
            runtime_version,
            information,
        })
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_be_u16(self.reserved)?;
        w.write_len_prefixed(self.serial)?;
        w.write_u8(self.endianness)?;
        w.write_all(&self.platform_id)?;
        w.write_len_prefixed(self.runtime_version)?;
        w.write_all(self.information)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{InfoResponse, LoginResponse};
    use crate::encoding::{Reader, Writer};
    use crate::DecodeError;

    #[test]
    fn login_response_roundtrip() {
        let resp = LoginResponse {
            protocol_version: 1,
            max_data: 1024,
            group: 3,
            image_guid: [0x5A; 16],
            optional: &[0xEE],
        };
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        resp.encode(&mut w).unwrap();
        assert_eq!(&w.as_written()[..4], &[0x01, 0x04, 0x00, 0x03]);

        let mut r = Reader::new(w.as_written());
        assert_eq!(LoginResponse::decode(&mut r).unwrap(), resp);
    }

    #[test]
    fn login_response_requires_guid() {
        let mut r = Reader::new(&[0x01, 0x04, 0x00, 0x03, 0xAA]);
        assert_eq!(
            LoginResponse::decode(&mut r).unwrap_err(),
            DecodeError::UnexpectedEof
        );
    }

    #[test]
    fn info_response_parses_variable_fields() {
        let bytes = [
            0x00, 0x00, // reserved
            0x03, 0x12, 0x34, 0x56, // serial
            0x01, // endianness
            0x00, 0x00, 0x01, 0x0F, // platform
            0x02, 0x02, 0x05, // version
            0xCA, 0xFE, // information
        ];
        let mut r = Reader::new(&bytes);
        let info = InfoResponse::decode(&mut r).unwrap();
        assert_eq!(info.serial, &[0x12, 0x34, 0x56]);
        assert_eq!(info.endianness, 1);
        assert_eq!(info.platform_id, [0x00, 0x00, 0x01, 0x0F]);
        assert_eq!(info.runtime_version, &[0x02, 0x05]);
        assert_eq!(info.information, &[0xCA, 0xFE]);

        let mut out = [0u8; 32];
        let mut w = Writer::new(&mut out);
        info.encode(&mut w).unwrap();
        assert_eq!(w.as_written(), &bytes);
    }
}

use crate::rtcp::{
    common_header::{CommonHeader, finish_packet},
    packet_type::{PT_SDES, RtcpPacketType},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

pub const MAX_CHUNKS: usize = 31;

/// SDES items per RFC3550 §6.5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdesItem {
    Cname(Vec<u8>), // type=1
    Name(Vec<u8>),  // 2
    Email(Vec<u8>), // 3
    Phone(Vec<u8>), // 4
    Loc(Vec<u8>),   // 5
    Tool(Vec<u8>),  // 6
    Note(Vec<u8>),  // 7
    Priv(Vec<u8>),  // 8 (opaque)
    Unknown(u8, Vec<u8>),
}

impl SdesItem {
    pub fn typ_code(&self) -> u8 {
        match self {
            SdesItem::Cname(_) => 1,
            SdesItem::Name(_) => 2,
            SdesItem::Email(_) => 3,
            SdesItem::Phone(_) => 4,
            SdesItem::Loc(_) => 5,
            SdesItem::Tool(_) => 6,
            SdesItem::Note(_) => 7,
            SdesItem::Priv(_) => 8,
            SdesItem::Unknown(t, _) => *t,
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            SdesItem::Cname(v)
            | SdesItem::Name(v)
            | SdesItem::Email(v)
            | SdesItem::Phone(v)
            | SdesItem::Loc(v)
            | SdesItem::Tool(v)
            | SdesItem::Note(v)
            | SdesItem::Priv(v)
            | SdesItem::Unknown(_, v) => v,
        }
    }

    fn from_wire(t: u8, data: &[u8]) -> Self {
        let v = data.to_vec();
        match t {
            1 => SdesItem::Cname(v),
            2 => SdesItem::Name(v),
            3 => SdesItem::Email(v),
            4 => SdesItem::Phone(v),
            5 => SdesItem::Loc(v),
            6 => SdesItem::Tool(v),
            7 => SdesItem::Note(v),
            8 => SdesItem::Priv(v),
            _ => SdesItem::Unknown(t, v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdesChunk {
    pub ssrc: u32,
    pub items: Vec<SdesItem>,
}

impl SdesChunk {
    pub fn cname_item(&self) -> Option<&[u8]> {
        self.items.iter().find_map(|it| match it {
            SdesItem::Cname(v) => Some(v.as_slice()),
            _ => None,
        })
    }

    /// Wire size of the chunk including END byte and boundary padding.
    pub fn wire_len(&self) -> usize {
        let items: usize = self.items.iter().map(|it| 2 + it.data().len()).sum();
        let raw = 4 + items + 1; // ssrc + items + END
        raw + (4 - raw % 4) % 4
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        let start = out.len();
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        for item in &self.items {
            let data = item.data();
            if data.len() > u8::MAX as usize {
                return Err(RtcpError::SdesItemTooLong);
            }
            out.push(item.typ_code());
            out.push(data.len() as u8);
            out.extend_from_slice(data);
        }
        out.push(0); // END
        let rem = (out.len() - start) % 4;
        if rem != 0 {
            out.extend(std::iter::repeat_n(0u8, 4 - rem));
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), RtcpError> {
        if buf.len() < 4 {
            return Err(RtcpError::TooShort);
        }
        let ssrc = u32::from_be_bytes(buf[0..4].try_into().map_err(|_| RtcpError::TooShort)?);
        let mut idx = 4usize;
        let mut items = Vec::new();

        // Items until END(0). After END, pad to 4-byte boundary.
        while idx < buf.len() {
            let t = buf[idx];
            idx += 1;
            if t == 0 {
                // move to 4-byte boundary relative to chunk start
                let chunk_len = idx; // includes END
                let pad = (4 - (chunk_len % 4)) % 4;
                if buf.len() < idx + pad {
                    return Err(RtcpError::Truncated);
                }
                idx += pad;
                break;
            }
            if buf.len() < idx + 1 {
                return Err(RtcpError::SdesItemTooShort);
            }
            let len = buf[idx] as usize;
            idx += 1;
            if buf.len() < idx + len {
                return Err(RtcpError::SdesItemTooShort);
            }
            items.push(SdesItem::from_wire(t, &buf[idx..idx + len]));
            idx += len;
        }

        Ok((Self { ssrc, items }, idx))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sdes {
    pub chunks: Vec<SdesChunk>,
}

impl Sdes {
    /// Single-chunk SDES carrying only a CNAME, the minimal compound filler.
    pub fn cname(ssrc: u32, cname: impl Into<Vec<u8>>) -> Self {
        Self {
            chunks: vec![SdesChunk {
                ssrc,
                items: vec![SdesItem::Cname(cname.into())],
            }],
        }
    }

    /// Wire size of the whole packet (header + chunks).
    pub fn wire_len(&self) -> usize {
        4 + self.chunks.iter().map(SdesChunk::wire_len).sum::<usize>()
    }
}

impl RtcpPacketType for Sdes {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        if self.chunks.len() > MAX_CHUNKS {
            return Err(RtcpError::TooManyReportBlocks(self.chunks.len()));
        }
        let start = out.len();
        let hdr = CommonHeader::new(self.chunks.len() as u8, PT_SDES, false);
        hdr.encode_into(out);
        for ch in &self.chunks {
            ch.encode_into(out)?;
        }
        finish_packet(out, start);
        Ok(())
    }

    fn decode(_hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        // SDES is a sequence of chunks occupying the whole payload.
        let mut chunks = Vec::new();
        let mut idx = 0usize;
        while idx + 4 <= payload.len() {
            let (chunk, used) = SdesChunk::decode(&payload[idx..])?;
            chunks.push(chunk);
            idx += used;
        }
        if idx != payload.len() {
            // trailing non-aligned data indicates malformed SDES
            return Err(RtcpError::Truncated);
        }
        Ok(RtcpPacket::Sdes(Sdes { chunks }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtcp::rtcp::RtcpPacket;

    #[test]
    fn cname_roundtrip() {
        let sdes = Sdes::cname(0x1234_5678, b"bridge@host".to_vec());
        let mut buf = Vec::new();
        sdes.encode_into(&mut buf).unwrap();
        assert_eq!(buf.len() % 4, 0);
        assert_eq!(buf.len(), sdes.wire_len());

        let (hdr, total) = CommonHeader::decode(&buf).unwrap();
        assert_eq!(total, buf.len());
        let dec = Sdes::decode(&hdr, &buf[4..]).unwrap();
        match dec {
            RtcpPacket::Sdes(s) => {
                assert_eq!(s.chunks.len(), 1);
                assert_eq!(s.chunks[0].ssrc, 0x1234_5678);
                assert_eq!(s.chunks[0].cname_item(), Some(&b"bridge@host"[..]));
            }
            other => panic!("wrong packet: {other:?}"),
        }
    }

    #[test]
    fn multi_item_chunk_roundtrip() {
        let chunk = SdesChunk {
            ssrc: 9,
            items: vec![
                SdesItem::Cname(b"a@b".to_vec()),
                SdesItem::Tool(b"rustysfu".to_vec()),
                SdesItem::Note(b"x".to_vec()),
            ],
        };
        let sdes = Sdes {
            chunks: vec![chunk.clone()],
        };
        let mut buf = Vec::new();
        sdes.encode_into(&mut buf).unwrap();
        let (hdr, _) = CommonHeader::decode(&buf).unwrap();
        match Sdes::decode(&hdr, &buf[4..]).unwrap() {
            RtcpPacket::Sdes(s) => assert_eq!(s.chunks[0], chunk),
            other => panic!("wrong packet: {other:?}"),
        }
    }

    #[test]
    fn item_longer_than_255_fails_fast() {
        let sdes = Sdes::cname(1, vec![b'x'; 256]);
        let mut buf = Vec::new();
        assert_eq!(
            sdes.encode_into(&mut buf).unwrap_err(),
            RtcpError::SdesItemTooLong
        );
    }

    #[test]
    fn wire_len_matches_encoded_len_for_padding_cases() {
        for cname_len in [1usize, 2, 3, 4, 5, 6, 7, 8] {
            let sdes = Sdes::cname(7, vec![b'c'; cname_len]);
            let mut buf = Vec::new();
            sdes.encode_into(&mut buf).unwrap();
            assert_eq!(buf.len(), sdes.wire_len(), "cname_len={cname_len}");
        }
    }
}

//! DTLS record-layer inspection used for wire demultiplexing and for the
//! outbound flight coalescer. Nothing here parses past the record header.

// Record content types (RFC 6347 §4.1)
pub const CT_CHANGE_CIPHER_SPEC: u8 = 20;
pub const CT_ALERT: u8 = 21;
pub const CT_HANDSHAKE: u8 = 22;
pub const CT_APPLICATION_DATA: u8 = 23;

// Handshake message types (RFC 5246 §7.4 / RFC 6347 §4.3.2)
pub const HT_HELLO_REQUEST: u8 = 0;
pub const HT_CLIENT_HELLO: u8 = 1;
pub const HT_HELLO_VERIFY_REQUEST: u8 = 3;
pub const HT_SERVER_HELLO_DONE: u8 = 14;
pub const HT_FINISHED: u8 = 20;

/// DTLS record header: type(1) epoch/seq(2+6) version(2) length(2).
pub const RECORD_HEADER_LEN: usize = 13;

const VERSION_DTLS_1_0: u16 = 0xFEFF;
const VERSION_DTLS_1_2: u16 = 0xFEFD;

/// Wire demultiplexing rule: a datagram is DTLS iff the first byte is a known
/// record type, bytes 1..3 carry a supported protocol version, and the
/// declared record length fits the buffer.
#[must_use]
pub fn looks_like_dtls(buf: &[u8]) -> bool {
    if buf.len() < RECORD_HEADER_LEN {
        return false;
    }
    if !matches!(
        buf[0],
        CT_CHANGE_CIPHER_SPEC | CT_ALERT | CT_HANDSHAKE | CT_APPLICATION_DATA
    ) {
        return false;
    }
    let version = u16::from_be_bytes([buf[1], buf[2]]);
    if version != VERSION_DTLS_1_0 && version != VERSION_DTLS_1_2 {
        return false;
    }
    let length = u16::from_be_bytes([buf[11], buf[12]]) as usize;
    RECORD_HEADER_LEN + length <= buf.len()
}

/// STUN keeps its first byte in 0..=3; the transformer forwards it untouched.
#[must_use]
pub fn looks_like_stun(buf: &[u8]) -> bool {
    !buf.is_empty() && buf[0] <= 3
}

/// Total wire size of the record starting at `buf`, when determinable.
#[must_use]
pub fn record_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < RECORD_HEADER_LEN {
        return None;
    }
    let length = u16::from_be_bytes([buf[11], buf[12]]) as usize;
    let total = RECORD_HEADER_LEN + length;
    (total <= buf.len()).then_some(total)
}

/// Whether this record terminates a handshake flight, i.e. the peer will not
/// send more records until it hears back. Flight-enders force a flush of the
/// coalescing buffer; alerts and application data are never coalesced.
#[must_use]
pub fn ends_flight(record: &[u8]) -> bool {
    if record.len() < RECORD_HEADER_LEN {
        return true;
    }
    match record[0] {
        CT_ALERT | CT_APPLICATION_DATA => true,
        CT_CHANGE_CIPHER_SPEC => false,
        CT_HANDSHAKE => {
            // handshake message type is the first fragment byte
            if record.len() <= RECORD_HEADER_LEN {
                return true;
            }
            matches!(
                record[RECORD_HEADER_LEN],
                HT_HELLO_REQUEST
                    | HT_CLIENT_HELLO
                    | HT_HELLO_VERIFY_REQUEST
                    | HT_SERVER_HELLO_DONE
                    | HT_FINISHED
            )
        }
        _ => true,
    }
}

/// Whether the record may sit in the coalescing buffer at all.
#[must_use]
pub fn coalescable(record: &[u8]) -> bool {
    !record.is_empty() && matches!(record[0], CT_CHANGE_CIPHER_SPEC | CT_HANDSHAKE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(ct: u8, version: u16, body: &[u8]) -> Vec<u8> {
        let mut rec = vec![ct];
        rec.extend_from_slice(&version.to_be_bytes());
        rec.extend_from_slice(&[0u8; 8]); // epoch + sequence
        rec.extend_from_slice(&(body.len() as u16).to_be_bytes());
        rec.extend_from_slice(body);
        rec
    }

    #[test]
    fn dispatch_rule() {
        let hs = make_record(CT_HANDSHAKE, VERSION_DTLS_1_2, &[HT_CLIENT_HELLO, 0, 0]);
        assert!(looks_like_dtls(&hs));

        // RTP first byte is 0x80
        assert!(!looks_like_dtls(&[0x80; 20]));
        // STUN binding request starts at 0
        assert!(looks_like_stun(&[0x00, 0x01, 0, 0]));
        assert!(!looks_like_stun(&[0x80]));

        // bad version
        let bad = make_record(CT_HANDSHAKE, 0x0303, &[HT_CLIENT_HELLO]);
        assert!(!looks_like_dtls(&bad));

        // declared length past the buffer
        let mut trunc = make_record(CT_HANDSHAKE, VERSION_DTLS_1_2, &[1, 2, 3]);
        trunc.truncate(trunc.len() - 1);
        assert!(!looks_like_dtls(&trunc));
    }

    #[test]
    fn flight_classification() {
        let ch = make_record(CT_HANDSHAKE, VERSION_DTLS_1_2, &[HT_CLIENT_HELLO]);
        let cert = make_record(CT_HANDSHAKE, VERSION_DTLS_1_2, &[11]); // certificate
        let fin = make_record(CT_HANDSHAKE, VERSION_DTLS_1_2, &[HT_FINISHED]);
        let ccs = make_record(CT_CHANGE_CIPHER_SPEC, VERSION_DTLS_1_2, &[1]);
        let alert = make_record(CT_ALERT, VERSION_DTLS_1_2, &[2, 10]);

        assert!(ends_flight(&ch));
        assert!(!ends_flight(&cert));
        assert!(ends_flight(&fin));
        assert!(!ends_flight(&ccs));
        assert!(ends_flight(&alert));

        assert!(coalescable(&cert));
        assert!(coalescable(&ccs));
        assert!(!coalescable(&alert));
    }

    #[test]
    fn record_len_walks_concatenated_records() {
        let a = make_record(CT_HANDSHAKE, VERSION_DTLS_1_2, &[11, 0, 0, 0]);
        let b = make_record(CT_CHANGE_CIPHER_SPEC, VERSION_DTLS_1_2, &[1]);
        let mut joined = a.clone();
        joined.extend_from_slice(&b);
        let first = record_len(&joined).unwrap();
        assert_eq!(first, a.len());
        assert_eq!(record_len(&joined[first..]).unwrap(), b.len());
    }
}

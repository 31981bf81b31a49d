//! Purpose: Length-prefixed framing for RPC payloads on a byte stream.
//! Exports: `write_frame`, `read_frame`, `FRAME_HEADER_LEN`, `MAX_PAYLOAD`.
//! Role: Lowest wire layer; the transport owns the stream, this module owns the bytes.
//! Invariants: Header is the payload length in ASCII decimal, zero-padded to 10 bytes.
//! Invariants: A short read or oversized length is a transport error, never a partial payload.
use crate::core::error::{Error, ErrorKind};
use std::io::{self, Read, Write};

pub const FRAME_HEADER_LEN: usize = 10;
pub const MAX_PAYLOAD: usize = 64 * 1024 * 1024;

pub fn encode_header(len: usize) -> Result<[u8; FRAME_HEADER_LEN], Error> {
    if len > MAX_PAYLOAD {
        return Err(Error::new(ErrorKind::Transport)
            .with_message(format!("frame payload of {len} bytes exceeds limit")));
    }
    let text = format!("{len:0width$}", width = FRAME_HEADER_LEN);
    let mut header = [0u8; FRAME_HEADER_LEN];
    header.copy_from_slice(text.as_bytes());
    Ok(header)
}

pub fn decode_header(header: &[u8; FRAME_HEADER_LEN]) -> Result<usize, Error> {
    if !header.iter().all(u8::is_ascii_digit) {
        return Err(Error::new(ErrorKind::Transport).with_message("frame header is not numeric"));
    }
    let len = header
        .iter()
        .try_fold(0usize, |len, digit| {
            len.checked_mul(10)?.checked_add(usize::from(digit - b'0'))
        })
        .ok_or_else(|| Error::new(ErrorKind::Transport).with_message("frame header length overflow"))?;
    if len > MAX_PAYLOAD {
        return Err(Error::new(ErrorKind::Transport)
            .with_message(format!("frame payload of {len} bytes exceeds limit")));
    }
    Ok(len)
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> Result<(), Error> {
    let header = encode_header(payload.len())?;
    writer
        .write_all(&header)
        .and_then(|()| writer.write_all(payload))
        .and_then(|()| writer.flush())
        .map_err(|err| map_io(err, "failed to write frame"))
}

pub fn read_frame(reader: &mut impl Read) -> Result<Vec<u8>, Error> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader
        .read_exact(&mut header)
        .map_err(|err| map_io(err, "failed to read frame header"))?;
    let len = decode_header(&header)?;
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .map_err(|err| map_io(err, "failed to read frame payload"))?;
    Ok(payload)
}

fn map_io(err: io::Error, context: &str) -> Error {
    let message = match err.kind() {
        io::ErrorKind::UnexpectedEof => format!("{context}: connection closed by peer"),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => format!("{context}: timed out"),
        _ => context.to_string(),
    };
    Error::new(ErrorKind::Transport)
        .with_message(message)
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::{FRAME_HEADER_LEN, MAX_PAYLOAD, decode_header, encode_header, read_frame, write_frame};
    use crate::core::error::ErrorKind;
    use std::io::Cursor;

    #[test]
    fn header_is_zero_padded_decimal() {
        let header = encode_header(42).expect("header");
        assert_eq!(&header, b"0000000042");
        assert_eq!(decode_header(&header).expect("len"), 42);
    }

    #[test]
    fn write_then_read_preserves_payload() {
        let mut buf = Vec::new();
        write_frame(&mut buf, br#"{"result":null}"#).expect("write");
        assert_eq!(buf.len(), FRAME_HEADER_LEN + 15);

        let mut cursor = Cursor::new(buf);
        let payload = read_frame(&mut cursor).expect("read");
        assert_eq!(payload, br#"{"result":null}"#);
    }

    #[test]
    fn non_numeric_header_is_transport_error() {
        let err = decode_header(b"00000x0042").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn largest_header_is_rejected_without_overflow() {
        let err = decode_header(b"9999999999").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(decode_header(b"0000000000").expect("len"), 0);
    }

    #[test]
    fn oversized_length_is_rejected() {
        let text = format!("{:010}", MAX_PAYLOAD + 1);
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(text.as_bytes());
        let err = decode_header(&header).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn truncated_payload_is_transport_error() {
        let mut cursor = Cursor::new(b"0000000010{\"a\"".to_vec());
        let err = read_frame(&mut cursor).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.message().unwrap_or_default().contains("closed by peer"));
    }
}

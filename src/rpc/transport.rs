//! Socket I/O discipline shared by the server and the client.
//!
//! Reads accumulate until the header block is complete, then pull exactly
//! as many body bytes as `Content-Length` announces. Writes loop over
//! partial sends until every byte is out. Timeouts are not errors: whatever
//! was transferred so far is returned, and the envelope layer catches the
//! truncation.

use std::sync::LazyLock;
use std::time::Duration;

use regex::bytes::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::error::TransportError;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

static CONTENT_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^content-length: *(\d+)\r?$").expect("content-length pattern is valid")
});

/// Write all of `data`, returning how many bytes went out.
///
/// Fewer than `data.len()` bytes are reported only when `limit` expires.
pub async fn send_all<W>(writer: &mut W, data: &[u8], limit: Duration) -> Result<usize, TransportError>
where
    W: AsyncWrite + Unpin,
{
    let deadline = Instant::now() + limit;
    let mut sent = 0;

    while sent < data.len() {
        match timeout_at(deadline, writer.write(&data[sent..])).await {
            Err(_) => {
                warn!(sent, total = data.len(), "Send timed out");
                return Ok(sent);
            }
            Ok(Ok(0)) => {
                return Err(TransportError::Send(std::io::ErrorKind::WriteZero.into()));
            }
            Ok(Ok(n)) => sent += n,
            Ok(Err(e)) => return Err(TransportError::Send(e)),
        }
    }

    Ok(sent)
}

/// Read one framed message.
///
/// Returns early, without error, when the peer closes the connection or
/// `limit` expires; the result may then be a truncated frame.
pub async fn receive_framed<R>(
    reader: &mut R,
    chunk_size: usize,
    limit: Duration,
) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + limit;
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];

    let header_len = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        match read_chunk(reader, &mut chunk, deadline).await? {
            Some(n) => buf.extend_from_slice(&chunk[..n]),
            None => return Ok(buf),
        }
    };

    let announced = content_length(&buf[..header_len]).unwrap_or(0);
    let Some(expected) = header_len.checked_add(announced) else {
        debug!(announced, "Content-Length overflows, not reading body");
        return Ok(buf);
    };
    while buf.len() < expected {
        let want = chunk.len().min(expected - buf.len());
        match read_chunk(reader, &mut chunk[..want], deadline).await? {
            Some(n) => buf.extend_from_slice(&chunk[..n]),
            None => {
                debug!(
                    received = buf.len(),
                    expected, "Connection closed before full body arrived"
                );
                break;
            }
        }
    }

    Ok(buf)
}

/// One read; `None` on EOF or deadline.
async fn read_chunk<R>(
    reader: &mut R,
    chunk: &mut [u8],
    deadline: Instant,
) -> Result<Option<usize>, TransportError>
where
    R: AsyncRead + Unpin,
{
    match timeout_at(deadline, reader.read(chunk)).await {
        Err(_) => {
            debug!("Receive timed out, returning partial data");
            Ok(None)
        }
        Ok(Ok(0)) => Ok(None),
        Ok(Ok(n)) => Ok(Some(n)),
        Ok(Err(e)) => Err(TransportError::Receive(e)),
    }
}

/// Length of the header block including the blank line.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

/// Case-insensitive `Content-Length` scan over raw header bytes. Only a
/// header line counts, not the same text inside another header's value.
fn content_length(headers: &[u8]) -> Option<usize> {
    let caps = CONTENT_LENGTH.captures(headers)?;
    std::str::from_utf8(&caps[1]).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn content_length_scan_ignores_case() {
        assert_eq!(content_length(b"POST / HTTP/1.1\r\ncontent-LENGTH: 42\r\n\r\n"), Some(42));
        assert_eq!(content_length(b"Content-Length:7\r\n"), Some(7));
        assert_eq!(content_length(b"Host: x\r\n\r\n"), None);
    }

    #[test]
    fn content_length_scan_needs_a_header_line() {
        let headers = b"POST / HTTP/1.1\r\nUser-Agent: x content-length: 99\r\nContent-Length: 3\r\n\r\n";
        assert_eq!(content_length(headers), Some(3));
        // the digits must sit on the header's own line
        assert_eq!(content_length(b"Content-Length:\r\n12\r\n\r\n"), None);
    }

    #[tokio::test]
    async fn huge_content_length_returns_what_arrived() {
        let (mut client, mut server) = duplex(128);
        let msg = b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nx";
        client.write_all(msg).await.unwrap();

        let got = receive_framed(&mut server, 16, Duration::from_millis(200)).await.unwrap();
        assert!(got.starts_with(b"POST / HTTP/1.1\r\n"));
        drop(client);
    }

    #[test]
    fn header_end_includes_blank_line() {
        assert_eq!(find_header_end(b"A\r\n\r\nbody"), Some(5));
        assert_eq!(find_header_end(b"A\r\n"), None);
    }

    #[tokio::test]
    async fn reads_exactly_the_announced_body() {
        let (mut client, mut server) = duplex(64);
        let msg = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";

        tokio::spawn(async move {
            // dribble the message in small pieces
            for piece in msg.chunks(3) {
                client.write_all(piece).await.unwrap();
            }
            // keep the pipe open so only the length stops the read
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let got = receive_framed(&mut server, 4, Duration::from_secs(2)).await.unwrap();
        assert_eq!(got, msg);
    }

    #[tokio::test]
    async fn early_close_returns_partial_frame() {
        let (mut client, mut server) = duplex(64);
        client
            .write_all(b"POST / HTTP/1.1\r\nContent-Length: 50\r\n\r\nshort")
            .await
            .unwrap();
        drop(client);

        let got = receive_framed(&mut server, 8, Duration::from_secs(1)).await.unwrap();
        assert!(got.ends_with(b"short"));
    }

    #[tokio::test]
    async fn timeout_returns_accumulated_data() {
        let (mut client, mut server) = duplex(64);
        client.write_all(b"POST / HTTP/1.1\r\n").await.unwrap();

        let got = receive_framed(&mut server, 8, Duration::from_millis(100)).await.unwrap();
        assert_eq!(got, b"POST / HTTP/1.1\r\n");
        drop(client);
    }

    #[tokio::test]
    async fn send_all_writes_everything() {
        let (mut client, mut server) = duplex(8);
        let data: Vec<u8> = (0..100u8).collect();

        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            server.read_to_end(&mut out).await.unwrap();
            out
        });

        let sent = send_all(&mut client, &data, Duration::from_secs(1)).await.unwrap();
        drop(client);

        assert_eq!(sent, data.len());
        assert_eq!(reader.await.unwrap(), data);
    }

    #[tokio::test]
    async fn send_timeout_reports_partial_count() {
        let (mut client, _server) = duplex(16);
        let data = vec![7u8; 64];

        let sent = send_all(&mut client, &data, Duration::from_millis(50)).await.unwrap();
        assert_eq!(sent, 16);
    }
}

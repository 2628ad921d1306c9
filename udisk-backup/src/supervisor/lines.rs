//! Record framing for rsync output.
//!
//! `--info=progress2` redraws its status line with `\r`, so both `\r` and
//! `\n` end a record. Empty records (from `\r\n` or repeated terminators)
//! are dropped.

use bytes::BytesMut;
use std::io;
use tokio_util::codec::Decoder;

/// Longest record emitted before a forced split
pub const MAX_RECORD_LEN: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct OutputLineCodec {
    // Bytes already searched for a terminator
    next_index: usize,
}

impl OutputLineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_record(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for OutputLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let found = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n' || *b == b'\r');

            match found {
                Some(offset) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let record = buf.split_to(end + 1);
                    let body = &record[..end];
                    if body.is_empty() {
                        continue;
                    }
                    return Ok(Some(to_record(body)));
                }
                None if buf.len() >= MAX_RECORD_LEN => {
                    self.next_index = 0;
                    let record = buf.split_to(MAX_RECORD_LEN);
                    return Ok(Some(to_record(&record)));
                }
                None => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(record) = self.decode(buf)? {
            return Ok(Some(record));
        }
        self.next_index = 0;
        if buf.is_empty() {
            Ok(None)
        } else {
            let record = buf.split_to(buf.len());
            Ok(Some(to_record(&record)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio_util::codec::FramedRead;

    async fn records(input: &[u8]) -> Vec<String> {
        FramedRead::new(input, OutputLineCodec::new())
            .filter_map(|r| async move { r.ok() })
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_splits_on_cr_and_lf() {
        let input = b"sending incremental file list\n  1,024  50%\r  2,048 100%\r\nNumber of files: 2\n";
        assert_eq!(
            records(input).await,
            vec![
                "sending incremental file list",
                "  1,024  50%",
                "  2,048 100%",
                "Number of files: 2",
            ]
        );
    }

    #[tokio::test]
    async fn test_trailing_record_without_terminator() {
        assert_eq!(records(b"first\nlast").await, vec!["first", "last"]);
        assert!(records(b"").await.is_empty());
        assert!(records(b"\r\n\n").await.is_empty());
    }

    #[test]
    fn test_partial_input_waits_for_terminator() {
        let mut codec = OutputLineCodec::new();
        let mut buf = BytesMut::from(&b"  1,0"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"24  50%\r");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("  1,024  50%".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = OutputLineCodec::new();
        let mut buf = BytesMut::from(&b"caf\xe9.txt\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("caf\u{fffd}.txt".to_string()));
    }

    #[test]
    fn test_overlong_record_is_split() {
        let mut codec = OutputLineCodec::new();
        let mut buf = BytesMut::from(vec![b'x'; MAX_RECORD_LEN + 10].as_slice());
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.len(), MAX_RECORD_LEN);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap().len(), 10);
    }
}

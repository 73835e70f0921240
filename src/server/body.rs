//! Reading a request off the wire.
//!
//! The head is read up to the blank line; the body is then framed by
//! `Content-Length` or chunked transfer encoding, and never allowed past the
//! configured limit.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::parser::HttpRequest;
use crate::server::error::Error;

/// Largest accepted request head.
pub(crate) const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Largest accepted chunk-size line, extensions included.
const MAX_CHUNK_LINE: usize = 1024;

/// Bytes received from the peer and not consumed yet.
pub(crate) struct RequestBuffer {
    pending: Vec<u8>,
    scratch: Vec<u8>,
}

impl RequestBuffer {
    pub(crate) fn new(read_buffer_size: usize) -> Self {
        Self {
            pending: Vec::new(),
            scratch: vec![0; read_buffer_size.max(1)],
        }
    }

    // Pull whatever the socket has into `pending`. Zero means end of stream.
    async fn fill<S>(&mut self, socket: &mut S) -> Result<usize, Error>
    where
        S: AsyncRead + Unpin,
    {
        let n = socket.read(&mut self.scratch).await?;
        self.pending.extend_from_slice(&self.scratch[..n]);
        Ok(n)
    }

    /// Read the request head, blank line included.
    ///
    /// `None` when the peer closed the connection without sending anything.
    pub(crate) async fn read_head<S>(&mut self, socket: &mut S) -> Result<Option<Vec<u8>>, Error>
    where
        S: AsyncRead + Unpin,
    {
        loop {
            if let Some(end) = find(&self.pending, b"\r\n\r\n") {
                return Ok(Some(self.pending.drain(..end + 4).collect()));
            }
            if self.pending.len() > MAX_HEAD_SIZE {
                return Err(Error::HeadTooLarge(MAX_HEAD_SIZE));
            }
            if self.fill(socket).await? == 0 {
                return if self.pending.is_empty() { Ok(None) } else { Err(Error::Incomplete) };
            }
        }
    }

    /// Read the body `request` announces, up to `limit` bytes.
    pub(crate) async fn read_body<S>(
        &mut self,
        socket: &mut S,
        request: &HttpRequest,
        limit: usize,
    ) -> Result<Vec<u8>, Error>
    where
        S: AsyncRead + Unpin,
    {
        if request.is_chunked() {
            return self.read_chunked(socket, limit).await;
        }

        match request.content_length()? {
            Some(len) if len > limit => Err(Error::PayloadTooLarge(limit)),
            Some(len) => self.read_exact(socket, len).await,
            None => Ok(Vec::new()),
        }
    }

    async fn read_exact<S>(&mut self, socket: &mut S, len: usize) -> Result<Vec<u8>, Error>
    where
        S: AsyncRead + Unpin,
    {
        while self.pending.len() < len {
            if self.fill(socket).await? == 0 {
                return Err(Error::Incomplete);
            }
        }
        Ok(self.pending.drain(..len).collect())
    }

    // A CRLF-terminated line without its terminator.
    async fn read_line<S>(&mut self, socket: &mut S, max: usize) -> Result<Vec<u8>, Error>
    where
        S: AsyncRead + Unpin,
    {
        loop {
            if let Some(end) = find(&self.pending, b"\r\n") {
                let mut line: Vec<u8> = self.pending.drain(..end + 2).collect();
                line.truncate(end);
                return Ok(line);
            }
            if self.pending.len() > max {
                return Err(Error::MalformedBody("line too long".to_string()));
            }
            if self.fill(socket).await? == 0 {
                return Err(Error::Incomplete);
            }
        }
    }

    async fn read_chunked<S>(&mut self, socket: &mut S, limit: usize) -> Result<Vec<u8>, Error>
    where
        S: AsyncRead + Unpin,
    {
        let mut body = Vec::new();

        loop {
            let line = self.read_line(socket, MAX_CHUNK_LINE).await?;
            let size = parse_chunk_size(&line)?;

            if size == 0 {
                // Trailers are read and ignored
                while !self.read_line(socket, MAX_HEAD_SIZE).await?.is_empty() {}
                return Ok(body);
            }

            if body.len().saturating_add(size) > limit {
                return Err(Error::PayloadTooLarge(limit));
            }

            body.extend(self.read_exact(socket, size).await?);

            if !self.read_line(socket, MAX_CHUNK_LINE).await?.is_empty() {
                return Err(Error::MalformedBody("chunk is not followed by CRLF".to_string()));
            }
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, Error> {
    let line = std::str::from_utf8(line).map_err(|_| Error::MalformedBody("chunk size is not UTF-8".to_string()))?;
    let digits = line.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(digits, 16).map_err(|_| Error::MalformedBody(format!("invalid chunk size '{digits}'")))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

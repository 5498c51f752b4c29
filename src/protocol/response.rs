//! Memcached ASCII protocol response builder

use bytes::BytesMut;
use itoa::Buffer;

/// Accumulates the replies for one batch of pipelined commands
pub struct ResponseWriter {
    buf: BytesMut,
}

impl ResponseWriter {
    /// Create a new response writer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the internal buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Take the buffer, leaving an empty buffer in its place
    pub fn take(&mut self) -> BytesMut {
        std::mem::take(&mut self.buf)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Drop everything written after `len`. Used to suppress replies for
    /// noreply commands.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// Write a VALUE line for get response
    /// Format: VALUE <key> <flags> <bytes>\r\n<data>\r\n
    pub fn value(&mut self, key: &[u8], flags: u32, data: &[u8]) {
        self.value_header(key, flags, data.len());
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Write a VALUE line for gets response
    /// Format: VALUE <key> <flags> <bytes> <cas>\r\n<data>\r\n
    pub fn value_with_cas(&mut self, key: &[u8], flags: u32, data: &[u8], cas: u64) {
        let mut itoa_buf = Buffer::new();
        self.value_header(key, flags, data.len());
        self.buf.extend_from_slice(b" ");
        self.buf.extend_from_slice(itoa_buf.format(cas).as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    fn value_header(&mut self, key: &[u8], flags: u32, len: usize) {
        let mut itoa_buf = Buffer::new();
        self.buf.extend_from_slice(b"VALUE ");
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(b" ");
        self.buf
            .extend_from_slice(itoa_buf.format(flags).as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf.extend_from_slice(itoa_buf.format(len).as_bytes());
    }

    /// Write END to terminate get response
    pub fn end(&mut self) {
        self.buf.extend_from_slice(b"END\r\n");
    }

    pub fn stored(&mut self) {
        self.buf.extend_from_slice(b"STORED\r\n");
    }

    pub fn not_stored(&mut self) {
        self.buf.extend_from_slice(b"NOT_STORED\r\n");
    }

    pub fn not_found(&mut self) {
        self.buf.extend_from_slice(b"NOT_FOUND\r\n");
    }

    pub fn deleted(&mut self) {
        self.buf.extend_from_slice(b"DELETED\r\n");
    }

    pub fn touched(&mut self) {
        self.buf.extend_from_slice(b"TOUCHED\r\n");
    }

    pub fn ok(&mut self) {
        self.buf.extend_from_slice(b"OK\r\n");
    }

    /// Write the result of incr/decr
    pub fn number(&mut self, value: u64) {
        let mut itoa_buf = Buffer::new();
        self.buf.extend_from_slice(itoa_buf.format(value).as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Write VERSION response
    /// Format: VERSION <version_string>\r\n
    pub fn version(&mut self, version: &str) {
        self.buf.extend_from_slice(b"VERSION ");
        self.buf.extend_from_slice(version.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Write the generic ERROR reply for unknown commands
    pub fn error(&mut self) {
        self.buf.extend_from_slice(b"ERROR\r\n");
    }

    /// Write CLIENT_ERROR response
    pub fn client_error(&mut self, message: &str) {
        self.buf.extend_from_slice(b"CLIENT_ERROR ");
        self.buf.extend_from_slice(message.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Write SERVER_ERROR response
    pub fn server_error(&mut self, message: &str) {
        self.buf.extend_from_slice(b"SERVER_ERROR ");
        self.buf.extend_from_slice(message.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value() {
        let mut writer = ResponseWriter::new(256);
        writer.value(b"mykey", 42, b"hello");
        assert_eq!(writer.buffer(), b"VALUE mykey 42 5\r\nhello\r\n");
    }

    #[test]
    fn test_value_with_cas() {
        let mut writer = ResponseWriter::new(256);
        writer.value_with_cas(b"mykey", 0, b"hi", 0);
        assert_eq!(writer.buffer(), b"VALUE mykey 0 2 0\r\nhi\r\n");
    }

    #[test]
    fn test_get_response() {
        let mut writer = ResponseWriter::new(256);
        writer.value(b"key1", 0, b"value1");
        writer.value(b"key2", 1, b"value2");
        writer.end();

        let expected = b"VALUE key1 0 6\r\nvalue1\r\nVALUE key2 1 6\r\nvalue2\r\nEND\r\n";
        assert_eq!(writer.buffer(), &expected[..]);
    }

    #[test]
    fn test_simple_responses() {
        let mut writer = ResponseWriter::new(256);

        writer.stored();
        assert_eq!(writer.take().as_ref(), b"STORED\r\n");

        writer.not_stored();
        assert_eq!(writer.take().as_ref(), b"NOT_STORED\r\n");

        writer.deleted();
        assert_eq!(writer.take().as_ref(), b"DELETED\r\n");

        writer.not_found();
        assert_eq!(writer.take().as_ref(), b"NOT_FOUND\r\n");

        writer.touched();
        assert_eq!(writer.take().as_ref(), b"TOUCHED\r\n");

        writer.ok();
        assert_eq!(writer.take().as_ref(), b"OK\r\n");

        writer.error();
        assert_eq!(writer.take().as_ref(), b"ERROR\r\n");
    }

    #[test]
    fn test_number() {
        let mut writer = ResponseWriter::new(64);
        writer.number(18446744073709551615);
        assert_eq!(writer.buffer(), b"18446744073709551615\r\n");
    }

    #[test]
    fn test_errors() {
        let mut writer = ResponseWriter::new(256);

        writer.client_error("bad command line format");
        assert_eq!(
            writer.take().as_ref(),
            b"CLIENT_ERROR bad command line format\r\n"
        );

        writer.server_error("out of memory storing object");
        assert_eq!(
            writer.take().as_ref(),
            b"SERVER_ERROR out of memory storing object\r\n"
        );
    }

    #[test]
    fn test_truncate_drops_suppressed_reply() {
        let mut writer = ResponseWriter::new(64);
        writer.stored();
        let mark = writer.len();
        writer.deleted();
        writer.truncate(mark);
        assert_eq!(writer.buffer(), b"STORED\r\n");
    }

    #[test]
    fn test_version() {
        let mut writer = ResponseWriter::new(256);
        writer.version("lrucached 0.1.0");
        assert_eq!(writer.buffer(), b"VERSION lrucached 0.1.0\r\n");
    }
}

// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::cmp;
use std::fmt;
use std::io;
use std::io::Read as StdRead;
use std::io::Write as StdWrite;
use std::net;
use std::net::SocketAddr;
use std::time::Duration;

use bufstream::BufStream;
use byteorder::LittleEndian as LE;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use io_enum::*;
#[cfg(windows)]
use named_pipe as np;
#[cfg(unix)]
use std::os::unix;

#[cfg(feature = "native-tls")]
use crate::conn::opts::SslOpts;

use crate::consts;
use crate::consts::ColumnType;
use crate::error::DriverError::ConnectTimeout;
use crate::error::DriverError::CouldNotConnect;
use crate::error::DriverError::PacketOutOfSync;
use crate::error::DriverError::PacketTooLarge;
use crate::error::Error::DriverError;
use crate::error::Result as MyResult;
use crate::value::Value;
use crate::value::Value::{Bytes, Date, Float, Int, Time, UInt, NULL};

mod tcp;

pub trait Read: ReadBytesExt + io::BufRead {
    fn read_lenenc_int(&mut self) -> io::Result<u64> {
        let head_byte = self.read_u8()?;
        let length = match head_byte {
            0xfc => 2,
            0xfd => 3,
            0xfe => 8,
            x => return Ok(x as u64),
        };
        let out = self.read_uint::<LE>(length)?;
        Ok(out)
    }

    fn read_lenenc_bytes(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_lenenc_int()?;
        let mut out = Vec::with_capacity(len as usize);
        let count = if len > 0 {
            self.take(len).read_to_end(&mut out)?
        } else {
            0
        };
        if count as u64 == len {
            Ok(out)
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "Unexpected EOF while reading length encoded string",
            ))
        }
    }

    fn read_to_null(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let c = self.read_u8()?;
            if c == 0u8 {
                break;
            }
            out.push(c);
        }
        Ok(out)
    }

    fn read_bin_value(&mut self, col_type: ColumnType, unsigned: bool) -> io::Result<Value> {
        match col_type {
            ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_SET
            | ColumnType::MYSQL_TYPE_ENUM
            | ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_VARCHAR
            | ColumnType::MYSQL_TYPE_BIT
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_GEOMETRY => Ok(Bytes(self.read_lenenc_bytes()?)),
            ColumnType::MYSQL_TYPE_TINY => {
                if unsigned {
                    Ok(Int(self.read_u8()? as i64))
                } else {
                    Ok(Int(self.read_i8()? as i64))
                }
            }
            ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
                if unsigned {
                    Ok(Int(self.read_u16::<LE>()? as i64))
                } else {
                    Ok(Int(self.read_i16::<LE>()? as i64))
                }
            }
            ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
                if unsigned {
                    Ok(Int(self.read_u32::<LE>()? as i64))
                } else {
                    Ok(Int(self.read_i32::<LE>()? as i64))
                }
            }
            ColumnType::MYSQL_TYPE_LONGLONG => {
                if unsigned {
                    Ok(UInt(self.read_u64::<LE>()?))
                } else {
                    Ok(Int(self.read_i64::<LE>()?))
                }
            }
            ColumnType::MYSQL_TYPE_FLOAT => Ok(Float(self.read_f32::<LE>()? as f64)),
            ColumnType::MYSQL_TYPE_DOUBLE => Ok(Float(self.read_f64::<LE>()?)),
            ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_DATE
            | ColumnType::MYSQL_TYPE_DATETIME => {
                let len = self.read_u8()?;
                let mut year = 0u16;
                let mut month = 0u8;
                let mut day = 0u8;
                let mut hour = 0u8;
                let mut minute = 0u8;
                let mut second = 0u8;
                let mut micro_second = 0u32;
                if len >= 4u8 {
                    year = self.read_u16::<LE>()?;
                    month = self.read_u8()?;
                    day = self.read_u8()?;
                }
                if len >= 7u8 {
                    hour = self.read_u8()?;
                    minute = self.read_u8()?;
                    second = self.read_u8()?;
                }
                if len == 11u8 {
                    micro_second = self.read_u32::<LE>()?;
                }
                Ok(Date(year, month, day, hour, minute, second, micro_second))
            }
            ColumnType::MYSQL_TYPE_TIME => {
                let len = self.read_u8()?;
                let mut is_negative = false;
                let mut days = 0u32;
                let mut hours = 0u8;
                let mut minutes = 0u8;
                let mut seconds = 0u8;
                let mut micro_seconds = 0u32;
                if len >= 8u8 {
                    is_negative = self.read_u8()? == 1u8;
                    days = self.read_u32::<LE>()?;
                    hours = self.read_u8()?;
                    minutes = self.read_u8()?;
                    seconds = self.read_u8()?;
                }
                if len == 12u8 {
                    micro_seconds = self.read_u32::<LE>()?;
                }
                Ok(Time(is_negative, days, hours, minutes, seconds, micro_seconds))
            }
            _ => Ok(NULL),
        }
    }

    /// Drops mysql packet payload. Returns new seq_id.
    fn drop_packet(&mut self, mut seq_id: u8) -> MyResult<u8> {
        use std::io::ErrorKind::Other;
        loop {
            let payload_len = self.read_uint::<LE>(3)? as usize;
            let srv_seq_id = self.read_u8()?;
            if srv_seq_id != seq_id {
                return Err(DriverError(PacketOutOfSync));
            }
            seq_id = seq_id.wrapping_add(1);
            if payload_len == 0 {
                break;
            } else {
                let mut remaining = payload_len as u64;
                while remaining > 0 {
                    let buffered = self.fill_buf()?;
                    if buffered.is_empty() {
                        return Err(
                            io::Error::new(Other, "Unexpected EOF while reading packet").into()
                        );
                    }
                    let count = cmp::min(remaining, buffered.len() as u64) as usize;
                    self.consume(count);
                    remaining -= count as u64;
                }
                if payload_len != consts::MAX_PAYLOAD_LEN {
                    break;
                }
            }
        }
        Ok(seq_id)
    }

    /// Reads mysql packet payload, reassembling a multi-packet payload into
    /// one buffer. Returns it with the new seq_id value.
    fn read_packet(&mut self, mut seq_id: u8) -> MyResult<(Vec<u8>, u8)> {
        use std::io::ErrorKind::Other;
        let mut output = Vec::new();
        loop {
            let payload_len = self.read_uint::<LE>(3)? as usize;
            let srv_seq_id = self.read_u8()?;
            if srv_seq_id != seq_id {
                return Err(DriverError(PacketOutOfSync));
            }
            seq_id = seq_id.wrapping_add(1);
            if payload_len == 0 {
                break;
            } else {
                output.reserve(payload_len);
                let mut chunk = self.take(payload_len as u64);
                let count = chunk.read_to_end(&mut output)?;
                if count != payload_len {
                    return Err(io::Error::new(Other, "Unexpected EOF while reading packet").into());
                }
                if payload_len != consts::MAX_PAYLOAD_LEN {
                    break;
                }
            }
        }
        Ok((output, seq_id))
    }
}

impl<T: ReadBytesExt + io::BufRead> Read for T {}

pub trait Write: WriteBytesExt {
    fn write_le_uint_n(&mut self, x: u64, len: usize) -> io::Result<()> {
        let mut buf = [0u8; 8];
        let mut offset = 0;
        while offset < len {
            buf[offset] = (((0xFF << (offset * 8)) & x) >> (offset * 8)) as u8;
            offset += 1;
        }
        StdWrite::write_all(self, &buf[..len])
    }

    fn write_lenenc_int(&mut self, x: u64) -> io::Result<()> {
        if x < 251 {
            self.write_u8(x as u8)?;
            Ok(())
        } else if x < 65_536 {
            self.write_u8(0xFC)?;
            self.write_le_uint_n(x, 2)
        } else if x < 16_777_216 {
            self.write_u8(0xFD)?;
            self.write_le_uint_n(x, 3)
        } else {
            self.write_u8(0xFE)?;
            self.write_le_uint_n(x, 8)
        }
    }

    fn write_lenenc_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_lenenc_int(bytes.len() as u64)?;
        self.write_all(bytes)
    }

    /// Writes one logical payload, splitting it into wire packets of at most
    /// `MAX_PAYLOAD_LEN` bytes. A payload that is an exact multiple of the
    /// limit is terminated by a zero-length packet. Returns the new seq_id.
    fn write_packet(
        &mut self,
        data: &[u8],
        mut seq_id: u8,
        max_allowed_packet: usize,
    ) -> MyResult<u8> {
        if data.len() > max_allowed_packet && max_allowed_packet < consts::MAX_PAYLOAD_LEN {
            return Err(DriverError(PacketTooLarge));
        }
        if data.is_empty() {
            self.write_all(&[0, 0, 0, seq_id])?;
            seq_id = seq_id.wrapping_add(1);
        } else {
            let mut last_was_max = false;
            for chunk in data.chunks(consts::MAX_PAYLOAD_LEN) {
                let chunk_len = chunk.len();
                self.write_le_uint_n(chunk_len as u64, 3)?;
                self.write_u8(seq_id)?;
                self.write_all(chunk)?;
                last_was_max = chunk_len == consts::MAX_PAYLOAD_LEN;
                seq_id = seq_id.wrapping_add(1);
            }
            if last_was_max {
                self.write_all(&[0u8, 0u8, 0u8, seq_id])?;
                seq_id = seq_id.wrapping_add(1);
            }
        }
        self.flush()?;
        Ok(seq_id)
    }
}

impl<T: WriteBytesExt> Write for T {}

/// Zlib framing that rides below the packet layer once compression is
/// negotiated. Frames carry their own sequence counter, independent of the
/// packet one, and both reset when a command round starts.
pub struct Compressed<T> {
    inner: T,
    seq_id: u8,
    in_buf: Vec<u8>,
    pos: usize,
    out_buf: Vec<u8>,
}

impl<T> Compressed<T> {
    pub fn new(inner: T) -> Compressed<T> {
        Compressed {
            inner,
            seq_id: 0,
            in_buf: Vec::new(),
            pos: 0,
            out_buf: Vec::new(),
        }
    }

    pub fn reset_seq(&mut self) {
        self.seq_id = 0;
    }
}

impl<T: io::Read> Compressed<T> {
    fn fill_frame(&mut self) -> io::Result<()> {
        let compressed_len = self.inner.read_uint::<LE>(3)? as usize;
        let srv_seq_id = self.inner.read_u8()?;
        let uncompressed_len = self.inner.read_uint::<LE>(3)? as usize;
        if srv_seq_id != self.seq_id {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Compressed frame out of sync",
            ));
        }
        self.seq_id = self.seq_id.wrapping_add(1);
        let mut payload = vec![0u8; compressed_len];
        self.inner.read_exact(&mut payload)?;
        if uncompressed_len == 0 {
            // Passthrough frame, the payload was never deflated.
            self.in_buf = payload;
        } else {
            let mut out = Vec::with_capacity(uncompressed_len);
            ZlibDecoder::new(&payload[..]).read_to_end(&mut out)?;
            if out.len() != uncompressed_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Compressed frame inflated to unexpected length",
                ));
            }
            self.in_buf = out;
        }
        self.pos = 0;
        Ok(())
    }
}

impl<T: io::Read> io::BufRead for Compressed<T> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.in_buf.len() {
            self.fill_frame()?;
        }
        Ok(&self.in_buf[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = cmp::min(self.pos + amt, self.in_buf.len());
    }
}

impl<T: io::Read> io::Read for Compressed<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = {
            let data = io::BufRead::fill_buf(self)?;
            let count = cmp::min(buf.len(), data.len());
            buf[..count].copy_from_slice(&data[..count]);
            count
        };
        io::BufRead::consume(self, count);
        Ok(count)
    }
}

impl<T: io::Write> io::Write for Compressed<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for chunk in self.out_buf.chunks(consts::MAX_PAYLOAD_LEN) {
            let mut compressed = None;
            if chunk.len() >= consts::MIN_COMPRESS_LEN {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(chunk)?;
                let deflated = encoder.finish()?;
                if deflated.len() < chunk.len() {
                    compressed = Some(deflated);
                }
            }
            match compressed {
                Some(deflated) => {
                    self.inner.write_le_uint_n(deflated.len() as u64, 3)?;
                    self.inner.write_u8(self.seq_id)?;
                    self.inner.write_le_uint_n(chunk.len() as u64, 3)?;
                    self.inner.write_all(&deflated)?;
                }
                None => {
                    self.inner.write_le_uint_n(chunk.len() as u64, 3)?;
                    self.inner.write_u8(self.seq_id)?;
                    self.inner.write_le_uint_n(0, 3)?;
                    self.inner.write_all(chunk)?;
                }
            }
            self.seq_id = self.seq_id.wrapping_add(1);
        }
        self.out_buf.clear();
        self.inner.flush()
    }
}

impl<T> fmt::Debug for Compressed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compressed stream")
    }
}

#[derive(Debug, Read, Write, BufRead)]
pub enum Stream {
    #[cfg(unix)]
    SocketStream(BufStream<unix::net::UnixStream>),
    #[cfg(windows)]
    SocketStream(BufStream<np::PipeClient>),
    TcpStream(TcpStream),
    Compressed(Box<Compressed<Stream>>),
}

impl Stream {
    #[cfg(unix)]
    pub fn connect_socket(
        socket: &str,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> MyResult<Stream> {
        match unix::net::UnixStream::connect(socket) {
            Ok(stream) => {
                stream.set_read_timeout(read_timeout)?;
                stream.set_write_timeout(write_timeout)?;
                Ok(Stream::SocketStream(BufStream::new(stream)))
            }
            Err(e) => {
                let addr = socket.to_string();
                let desc = format!("{}", e);
                Err(DriverError(CouldNotConnect(Some((addr, desc, e.kind())))))
            }
        }
    }

    #[cfg(windows)]
    pub fn connect_socket(
        socket: &str,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> MyResult<Stream> {
        let full_name = format!(r"\\.\pipe\{}", socket);
        match np::PipeClient::connect(full_name.clone()) {
            Ok(mut stream) => {
                stream.set_read_timeout(read_timeout);
                stream.set_write_timeout(write_timeout);
                Ok(Stream::SocketStream(BufStream::new(stream)))
            }
            Err(e) => {
                let desc = format!("{}", e);
                Err(DriverError(CouldNotConnect(Some((
                    full_name,
                    desc,
                    e.kind(),
                )))))
            }
        }
    }

    #[cfg(all(not(unix), not(windows)))]
    pub fn connect_socket(
        _socket: &str,
        _read_timeout: Option<Duration>,
        _write_timeout: Option<Duration>,
    ) -> MyResult<Stream> {
        unimplemented!("Sockets are not implemented on current platform");
    }

    #[allow(clippy::too_many_arguments)]
    pub fn connect_tcp(
        ip_or_hostname: &str,
        port: u16,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
        tcp_keepalive_time: Option<Duration>,
        tcp_connect_timeout: Option<Duration>,
        tcp_nodelay: bool,
        bind_address: Option<SocketAddr>,
    ) -> MyResult<Stream> {
        let mut builder = tcp::MyTcpBuilder::new((ip_or_hostname, port));
        builder
            .connect_timeout(tcp_connect_timeout)
            .read_timeout(read_timeout)
            .write_timeout(write_timeout)
            .keepalive_time(tcp_keepalive_time)
            .nodelay(tcp_nodelay)
            .bind_address(bind_address);
        builder
            .connect()
            .map(|stream| Stream::TcpStream(TcpStream::Insecure(BufStream::new(stream))))
            .map_err(|err| {
                if err.kind() == io::ErrorKind::TimedOut {
                    DriverError(ConnectTimeout)
                } else {
                    let addr = format!("{}:{}", ip_or_hostname, port);
                    let desc = format!("{}", err);
                    DriverError(CouldNotConnect(Some((addr, desc, err.kind()))))
                }
            })
    }

    pub fn is_insecure(&self) -> bool {
        matches!(self, Stream::TcpStream(TcpStream::Insecure(_)))
    }

    pub fn is_socket(&self) -> bool {
        #[cfg(any(unix, windows))]
        {
            matches!(self, Stream::SocketStream(_))
        }
        #[cfg(all(not(unix), not(windows)))]
        {
            false
        }
    }

    /// Wraps the whole stream into the compressed framing. Must happen after
    /// authentication, never before.
    pub fn make_compressed(self) -> Stream {
        Stream::Compressed(Box::new(Compressed::new(self)))
    }

    /// Resets the frame sequence counter on a compressed stream. No-op on a
    /// plain one.
    pub fn reset_compressed_seq_id(&mut self) {
        if let Stream::Compressed(ref mut compressed) = *self {
            compressed.reset_seq();
        }
    }
}

#[cfg(feature = "native-tls")]
impl Stream {
    pub fn make_secure(self, ip_or_hostname: &str, ssl_opts: &SslOpts) -> MyResult<Stream> {
        use std::fs::File;

        use native_tls::{Certificate, Identity, TlsConnector};

        if !self.is_insecure() {
            return Ok(self);
        }

        let mut builder = TlsConnector::builder();
        if let Some(root_cert_path) = ssl_opts.root_cert_path() {
            let mut root_cert_data = Vec::new();
            let mut root_cert_file = File::open(root_cert_path)?;
            root_cert_file.read_to_end(&mut root_cert_data)?;
            builder.add_root_certificate(Certificate::from_pem(&root_cert_data)?);
        }
        if let Some(pkcs12_path) = ssl_opts.pkcs12_path() {
            let der = {
                let mut der = Vec::new();
                let mut pkcs12_file = File::open(pkcs12_path)?;
                pkcs12_file.read_to_end(&mut der)?;
                der
            };
            let identity = Identity::from_pkcs12(&der, ssl_opts.password().unwrap_or(""))?;
            builder.identity(identity);
        }
        builder.danger_accept_invalid_certs(ssl_opts.accept_invalid_certs());
        builder.danger_accept_invalid_hostnames(ssl_opts.skip_domain_validation());
        let connector = builder.build()?;

        match self {
            Stream::TcpStream(TcpStream::Insecure(mut stream)) => {
                stream.flush()?;
                let stream = stream.into_inner().map_err(|e| {
                    io::Error::new(io::ErrorKind::Other, format!("{}", e.error()))
                })?;
                let secure = connector.connect(ip_or_hostname, stream)?;
                Ok(Stream::TcpStream(TcpStream::Secure(BufStream::new(secure))))
            }
            stream => Ok(stream),
        }
    }
}

#[derive(Read, Write, BufRead)]
pub enum TcpStream {
    #[cfg(feature = "native-tls")]
    Secure(BufStream<native_tls::TlsStream<net::TcpStream>>),
    Insecure(BufStream<net::TcpStream>),
}

impl fmt::Debug for TcpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            #[cfg(feature = "native-tls")]
            TcpStream::Secure(_) => write!(f, "Secure stream"),
            TcpStream::Insecure(ref s) => write!(f, "Insecure stream {:?}", s),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Read as StdRead, Write as StdWrite};

    use super::{Compressed, Read, Write};
    use crate::consts::MAX_PAYLOAD_LEN;

    #[test]
    fn should_roundtrip_lenenc_ints_at_boundaries() {
        for &x in &[
            0u64,
            250,
            251,
            65_535,
            65_536,
            16_777_215,
            16_777_216,
            u64::MAX,
        ] {
            let mut buf = Vec::new();
            buf.write_lenenc_int(x).unwrap();
            let mut cursor = Cursor::new(buf);
            assert_eq!(cursor.read_lenenc_int().unwrap(), x);
        }
    }

    #[test]
    fn should_use_shortest_lenenc_form() {
        let mut buf = Vec::new();
        buf.write_lenenc_int(250).unwrap();
        assert_eq!(buf, vec![250]);
        buf.clear();
        buf.write_lenenc_int(251).unwrap();
        assert_eq!(buf, vec![0xfc, 251, 0]);
        buf.clear();
        buf.write_lenenc_int(65_536).unwrap();
        assert_eq!(buf, vec![0xfd, 0, 0, 1]);
        buf.clear();
        buf.write_lenenc_int(16_777_216).unwrap();
        // The 0xfe form always carries a full 8-byte integer.
        assert_eq!(buf, vec![0xfe, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn read_to_null_consumes_the_terminator() {
        let mut cursor = Cursor::new(b"5.7.44\0rest".to_vec());
        assert_eq!(cursor.read_to_null().unwrap(), b"5.7.44".to_vec());
        let mut tail = Vec::new();
        cursor.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, b"rest".to_vec());
    }

    #[test]
    fn should_roundtrip_small_packet() {
        let payload = b"\x03SELECT 1".to_vec();
        let mut buf = Vec::new();
        let seq_id = buf.write_packet(&payload, 0, MAX_PAYLOAD_LEN).unwrap();
        assert_eq!(seq_id, 1);
        assert_eq!(&buf[..4], &[9, 0, 0, 0]);
        let mut cursor = Cursor::new(buf);
        let (read_back, seq_id) = cursor.read_packet(0).unwrap();
        assert_eq!(read_back, payload);
        assert_eq!(seq_id, 1);
    }

    #[test]
    fn should_split_and_reassemble_huge_packet() {
        let payload = vec![0x42u8; MAX_PAYLOAD_LEN + 1];
        let mut buf = Vec::new();
        let seq_id = buf.write_packet(&payload, 0, MAX_PAYLOAD_LEN + 1).unwrap();
        assert_eq!(seq_id, 2);
        assert_eq!(&buf[..4], &[0xff, 0xff, 0xff, 0]);
        let second_header_at = 4 + MAX_PAYLOAD_LEN;
        assert_eq!(
            &buf[second_header_at..second_header_at + 4],
            &[1, 0, 0, 1]
        );
        let mut cursor = Cursor::new(buf);
        let (read_back, seq_id) = cursor.read_packet(0).unwrap();
        assert_eq!(read_back.len(), payload.len());
        assert_eq!(seq_id, 2);
    }

    #[test]
    fn should_terminate_exact_multiple_with_empty_packet() {
        let payload = vec![0x42u8; MAX_PAYLOAD_LEN];
        let mut buf = Vec::new();
        let seq_id = buf.write_packet(&payload, 0, MAX_PAYLOAD_LEN).unwrap();
        assert_eq!(seq_id, 2);
        assert_eq!(buf.len(), 4 + MAX_PAYLOAD_LEN + 4);
        assert_eq!(&buf[4 + MAX_PAYLOAD_LEN..], &[0, 0, 0, 1]);
        let mut cursor = Cursor::new(buf);
        let (read_back, _) = cursor.read_packet(0).unwrap();
        assert_eq!(read_back.len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn should_reject_out_of_sync_packet() {
        let mut buf = Vec::new();
        buf.write_packet(b"xyz", 3, MAX_PAYLOAD_LEN).unwrap();
        let mut cursor = Cursor::new(buf);
        assert!(cursor.read_packet(0).is_err());
    }

    #[test]
    fn should_passthrough_short_compressed_frames() {
        let payload = b"ping".to_vec();
        let mut writer = Compressed::new(Vec::new());
        writer.write_all(&payload).unwrap();
        writer.flush().unwrap();
        let frames = writer.inner;
        // 7 byte frame header, uncompressed length slot zeroed.
        assert_eq!(&frames[..7], &[4, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&frames[7..], &payload[..]);

        let mut reader = Compressed::new(Cursor::new(frames));
        let mut read_back = vec![0u8; payload.len()];
        reader.read_exact(&mut read_back).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn should_deflate_long_compressed_frames() {
        let payload = vec![b'a'; 1024];
        let mut writer = Compressed::new(Vec::new());
        writer.write_all(&payload).unwrap();
        writer.flush().unwrap();
        let frames = writer.inner;
        // Deflated body must be shorter than the original.
        let compressed_len =
            frames[0] as usize | (frames[1] as usize) << 8 | (frames[2] as usize) << 16;
        assert!(compressed_len < payload.len());
        let uncompressed_len =
            frames[4] as usize | (frames[5] as usize) << 8 | (frames[6] as usize) << 16;
        assert_eq!(uncompressed_len, payload.len());

        let mut reader = Compressed::new(Cursor::new(frames));
        let mut read_back = vec![0u8; payload.len()];
        reader.read_exact(&mut read_back).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn should_reject_out_of_sync_compressed_frame() {
        let payload = b"ping".to_vec();
        let mut writer = Compressed::new(Vec::new());
        writer.write_all(&payload).unwrap();
        writer.flush().unwrap();

        let mut reader = Compressed::new(Cursor::new(writer.inner));
        reader.seq_id = 1;
        let mut read_back = vec![0u8; payload.len()];
        assert!(reader.read_exact(&mut read_back).is_err());
    }
}

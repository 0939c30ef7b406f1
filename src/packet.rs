// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::io::Read as StdRead;
use std::{fmt, str};

use byteorder::LittleEndian as LE;
use byteorder::ReadBytesExt;

use crate::consts::{
    CapabilityFlags, ColumnFlags, ColumnType, FormatEra, ProtocolProfile, StatusFlags,
};
use crate::error::DriverError::{CouldNotParseVersion, UnexpectedPacket};
use crate::error::Error::DriverError;
use crate::error::{MySqlError, Result as MyResult};
use crate::io::Read;

/// First payload byte of an OK packet.
pub const OK_HEADER: u8 = 0x00;
/// First payload byte of an ERR packet.
pub const ERR_HEADER: u8 = 0xff;
/// First payload byte of a LOCAL INFILE request.
pub const LOCAL_INFILE_HEADER: u8 = 0xfb;
/// First payload byte of an EOF packet, also the value range boundary that
/// separates EOF packets from huge lenenc column counts.
pub const EOF_HEADER: u8 = 0xfe;

pub fn is_ok_packet(payload: &[u8]) -> bool {
    !payload.is_empty() && payload[0] == OK_HEADER
}

pub fn is_err_packet(payload: &[u8]) -> bool {
    !payload.is_empty() && payload[0] == ERR_HEADER
}

/// An EOF packet starts with 0xfe and is short. A lenenc integer also starts
/// with 0xfe when it needs eight bytes, so length disambiguates.
pub fn is_eof_packet(payload: &[u8]) -> bool {
    !payload.is_empty() && payload[0] == EOF_HEADER && payload.len() < 0xfe
}

pub fn is_local_infile_packet(payload: &[u8]) -> bool {
    !payload.is_empty() && payload[0] == LOCAL_INFILE_HEADER
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: StatusFlags,
    pub warnings: u16,
    pub info: Vec<u8>,
}

impl OkPacket {
    pub fn from_payload(pld: &[u8], era: FormatEra) -> MyResult<OkPacket> {
        let mut reader = &pld[1..];
        let affected_rows = reader.read_lenenc_int()?;
        let last_insert_id = reader.read_lenenc_int()?;
        let status_flags;
        let mut warnings = 0;
        if era.is_41() {
            status_flags = StatusFlags::from_bits_truncate(reader.read_u16::<LE>()?);
            warnings = reader.read_u16::<LE>()?;
        } else if reader.len() >= 2 {
            status_flags = StatusFlags::from_bits_truncate(reader.read_u16::<LE>()?);
        } else {
            status_flags = StatusFlags::empty();
        }
        let mut info = Vec::new();
        reader.read_to_end(&mut info)?;
        Ok(OkPacket {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct ErrPacket {
    pub sql_state: Vec<u8>,
    pub error_message: Vec<u8>,
    pub error_code: u16,
}

impl ErrPacket {
    pub fn from_payload(pld: &[u8]) -> MyResult<ErrPacket> {
        let mut reader = &pld[1..];
        let error_code = reader.read_u16::<LE>()?;
        // The sql state marker only appears on protocol 4.1 servers.
        let sql_state = if reader.first() == Some(&b'#') && reader.len() >= 6 {
            let sql_state = reader[1..6].to_vec();
            reader = &reader[6..];
            sql_state
        } else {
            b"HY000".to_vec()
        };
        let mut error_message = Vec::new();
        reader.read_to_end(&mut error_message)?;
        Ok(ErrPacket {
            sql_state,
            error_message,
            error_code,
        })
    }

    pub fn into_mysql_error(self) -> MySqlError {
        MySqlError {
            state: String::from_utf8_lossy(&self.sql_state).into_owned(),
            message: String::from_utf8_lossy(&self.error_message).into_owned(),
            code: self.error_code,
        }
    }
}

impl fmt::Display for ErrPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ERROR {} ({}): {}",
            self.error_code,
            String::from_utf8_lossy(&self.sql_state),
            String::from_utf8_lossy(&self.error_message),
        )
    }
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: StatusFlags,
}

impl EofPacket {
    pub fn from_payload(pld: &[u8], era: FormatEra) -> MyResult<EofPacket> {
        let mut reader = &pld[1..];
        if era.is_41() && reader.len() >= 4 {
            let warnings = reader.read_u16::<LE>()?;
            let status_flags = StatusFlags::from_bits_truncate(reader.read_u16::<LE>()?);
            Ok(EofPacket {
                warnings,
                status_flags,
            })
        } else {
            // Pre-4.1 EOF is the bare 0xfe byte.
            Ok(EofPacket {
                warnings: 0,
                status_flags: StatusFlags::empty(),
            })
        }
    }
}

/// The server greeting, first packet on the wire.
#[derive(Clone, Debug)]
pub struct HandshakePacket {
    pub auth_plugin_data: Vec<u8>,
    pub auth_plugin_name: Vec<u8>,
    pub server_version: (u16, u16, u16),
    pub connection_id: u32,
    pub capability_flags: CapabilityFlags,
    pub status_flags: StatusFlags,
    pub protocol_version: u8,
    pub character_set: u8,
}

impl HandshakePacket {
    pub fn from_payload(pld: &[u8]) -> MyResult<HandshakePacket> {
        let mut reader = pld;
        let mut auth_plugin_data: Vec<u8> = Vec::with_capacity(32);
        let mut auth_plugin_name: Vec<u8> = Vec::with_capacity(32);
        let mut character_set = 0u8;
        let mut status_flags = 0u16;
        let protocol_version = reader.read_u8()?;
        let version_bytes = reader.read_to_null()?;
        let server_version = parse_version(&version_bytes)?;
        let connection_id = reader.read_u32::<LE>()?;
        let mut scramble_head = [0u8; 8];
        reader.read_exact(&mut scramble_head)?;
        auth_plugin_data.extend_from_slice(&scramble_head);
        // filler
        reader.read_u8()?;
        let mut capability_flags = reader.read_u16::<LE>()? as u32;
        if !reader.is_empty() {
            character_set = reader.read_u8()?;
            status_flags = reader.read_u16::<LE>()?;
            capability_flags |= (reader.read_u16::<LE>()? as u32) << 16;
            let length_of_auth_plugin_data =
                if capability_flags & CapabilityFlags::CLIENT_PLUGIN_AUTH.bits() > 0 {
                    reader.read_u8()? as i16
                } else {
                    reader.read_u8()?;
                    0
                };
            let mut reserved = [0u8; 10];
            reader.read_exact(&mut reserved)?;
            if capability_flags & CapabilityFlags::CLIENT_SECURE_CONNECTION.bits() > 0 {
                let mut len = length_of_auth_plugin_data - 8i16;
                len = if len > 13i16 { len } else { 13i16 };
                let mut tail = vec![0u8; len as usize];
                reader.read_exact(&mut tail)?;
                auth_plugin_data.extend_from_slice(&tail);
                if auth_plugin_data.last() == Some(&0u8) {
                    auth_plugin_data.pop();
                }
            }
            if capability_flags & CapabilityFlags::CLIENT_PLUGIN_AUTH.bits() > 0 {
                reader.read_to_end(&mut auth_plugin_name)?;
                if auth_plugin_name.last() == Some(&0u8) {
                    auth_plugin_name.pop();
                }
            }
        }
        Ok(HandshakePacket {
            auth_plugin_data,
            auth_plugin_name,
            server_version,
            connection_id,
            capability_flags: CapabilityFlags::from_bits_truncate(capability_flags),
            status_flags: StatusFlags::from_bits_truncate(status_flags),
            protocol_version,
            character_set,
        })
    }
}

fn parse_version(bytes: &[u8]) -> MyResult<(u16, u16, u16)> {
    let s = str::from_utf8(bytes).map_err(|_| DriverError(CouldNotParseVersion))?;
    let mut parts = s.splitn(3, '.');
    let major = parts
        .next()
        .and_then(|x| x.parse::<u16>().ok())
        .ok_or(DriverError(CouldNotParseVersion))?;
    let minor = parts
        .next()
        .and_then(|x| x.parse::<u16>().ok())
        .ok_or(DriverError(CouldNotParseVersion))?;
    let patch = parts
        .next()
        .map(|x| {
            let digits: String = x.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u16>().unwrap_or(0)
        })
        .unwrap_or(0);
    Ok((major, minor, patch))
}

/// Column descriptor from a result set header. The 4.1 layout carries the
/// full catalog chain, pre-4.1 servers send a much shorter one.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Column {
    pub schema: Vec<u8>,
    pub table: Vec<u8>,
    pub org_table: Vec<u8>,
    pub name: Vec<u8>,
    pub org_name: Vec<u8>,
    pub column_length: u32,
    pub character_set: u16,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl Column {
    pub fn from_payload(pld: &[u8], profile: &ProtocolProfile) -> MyResult<Column> {
        if profile.era.is_41() {
            Column::from_payload_41(pld)
        } else {
            Column::from_payload_320(pld, profile)
        }
    }

    fn from_payload_41(pld: &[u8]) -> MyResult<Column> {
        let mut reader = pld;
        // catalog, always "def"
        reader.read_lenenc_bytes()?;
        let schema = reader.read_lenenc_bytes()?;
        let table = reader.read_lenenc_bytes()?;
        let org_table = reader.read_lenenc_bytes()?;
        let name = reader.read_lenenc_bytes()?;
        let org_name = reader.read_lenenc_bytes()?;
        // length of the fixed block, always 0x0c
        reader.read_lenenc_int()?;
        let character_set = reader.read_u16::<LE>()?;
        let column_length = reader.read_u32::<LE>()?;
        let column_type =
            ColumnType::from_wire(reader.read_u8()?).ok_or(DriverError(UnexpectedPacket))?;
        let flags = ColumnFlags::from_bits_truncate(reader.read_u16::<LE>()?);
        let decimals = reader.read_u8()?;
        Ok(Column {
            schema,
            table,
            org_table,
            name,
            org_name,
            column_length,
            character_set,
            column_type,
            flags,
            decimals,
        })
    }

    fn from_payload_320(pld: &[u8], profile: &ProtocolProfile) -> MyResult<Column> {
        let mut reader = pld;
        let table = reader.read_lenenc_bytes()?;
        let name = reader.read_lenenc_bytes()?;
        // 3-byte column length behind a one byte length prefix
        let length_len = reader.read_u8()? as usize;
        let column_length = reader.read_uint::<LE>(length_len)? as u32;
        // one byte column type behind a one byte length prefix
        reader.read_u8()?;
        let column_type =
            ColumnType::from_wire(reader.read_u8()?).ok_or(DriverError(UnexpectedPacket))?;
        let flags_len = reader.read_u8()?;
        let flags = if profile.has_capability(CapabilityFlags::CLIENT_LONG_FLAG) && flags_len == 3 {
            ColumnFlags::from_bits_truncate(reader.read_u16::<LE>()?)
        } else {
            ColumnFlags::from_bits_truncate(reader.read_u8()? as u16)
        };
        let decimals = reader.read_u8()?;
        Ok(Column {
            schema: Vec::new(),
            table,
            org_table: Vec::new(),
            name,
            org_name: Vec::new(),
            column_length,
            character_set: 0,
            column_type,
            flags,
            decimals,
        })
    }

    pub fn name_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Numeric columns. Decimals travel as strings but keep the NUM flag.
    pub fn is_numeric(&self) -> bool {
        self.column_type.is_numeric_type() || self.flags.contains(ColumnFlags::NUM_FLAG)
    }

    /// Character set 63 marks a binary payload regardless of the type code.
    pub fn is_binary(&self) -> bool {
        self.character_set == 63 && !self.is_numeric()
    }

    pub fn is_text(&self) -> bool {
        !self.is_numeric() && !self.is_binary()
    }
}

#[cfg(test)]
mod test {
    use super::{Column, EofPacket, ErrPacket, HandshakePacket, OkPacket};
    use crate::consts::{
        CapabilityFlags, ColumnFlags, ColumnType, FormatEra, ProtocolProfile, StatusFlags,
    };

    #[test]
    fn should_parse_ok_packet() {
        let payload = [0u8, 1u8, 2u8, 3u8, 0u8, 4u8, 0u8, 32u8];
        let ok_packet = OkPacket::from_payload(&payload, FormatEra::Modern50).unwrap();
        assert_eq!(ok_packet.affected_rows, 1);
        assert_eq!(ok_packet.last_insert_id, 2);
        assert_eq!(ok_packet.status_flags.bits(), 3);
        assert_eq!(ok_packet.warnings, 4);
        assert_eq!(ok_packet.info, vec![32u8]);
    }

    #[test]
    fn should_parse_old_ok_packet_without_warnings() {
        let payload = [0u8, 1u8, 2u8, 3u8, 0u8];
        let ok_packet = OkPacket::from_payload(&payload, FormatEra::Pre41).unwrap();
        assert_eq!(ok_packet.affected_rows, 1);
        assert_eq!(ok_packet.last_insert_id, 2);
        assert_eq!(ok_packet.status_flags.bits(), 3);
        assert_eq!(ok_packet.warnings, 0);
    }

    #[test]
    fn should_parse_err_packet() {
        let payload = [
            255u8, 1u8, 0u8, 35u8, 51u8, 68u8, 48u8, 48u8, 48u8, 32u8, 32u8,
        ];
        let err_packet = ErrPacket::from_payload(&payload).unwrap();
        assert_eq!(err_packet.error_code, 1);
        assert_eq!(err_packet.sql_state, b"3D000".to_vec());
        assert_eq!(err_packet.error_message, vec![32u8, 32u8]);
    }

    #[test]
    fn should_default_sql_state_without_marker() {
        let payload = b"\xff\x28\x04oops".to_vec();
        let err_packet = ErrPacket::from_payload(&payload).unwrap();
        assert_eq!(err_packet.error_code, 1064);
        assert_eq!(err_packet.sql_state, b"HY000".to_vec());
        assert_eq!(err_packet.error_message, b"oops".to_vec());
    }

    #[test]
    fn should_parse_eof_packet() {
        let payload = [0xfe_u8, 1u8, 0u8, 8u8, 0u8];
        let eof_packet = EofPacket::from_payload(&payload, FormatEra::Modern50).unwrap();
        assert_eq!(eof_packet.warnings, 1);
        assert_eq!(
            eof_packet.status_flags,
            StatusFlags::SERVER_MORE_RESULTS_EXISTS
        );
    }

    #[test]
    fn should_parse_bare_old_eof_packet() {
        let payload = [0xfe_u8];
        let eof_packet = EofPacket::from_payload(&payload, FormatEra::Pre41).unwrap();
        assert_eq!(eof_packet.warnings, 0);
        assert_eq!(eof_packet.status_flags, StatusFlags::empty());
    }

    #[test]
    fn should_parse_short_handshake_packet() {
        let payload = [
            0x0a_u8, b'3', b'.', b'2', b'3', b'.', b'5', b'8', 0u8, 1u8, 0u8, 0u8, 0u8, 1u8, 2u8,
            3u8, 4u8, 5u8, 6u8, 7u8, 8u8, 0u8, 3u8, 0x80_u8,
        ];
        let handshake = HandshakePacket::from_payload(&payload).unwrap();
        assert_eq!(handshake.protocol_version, 0x0a);
        assert_eq!(handshake.server_version, (3, 23, 58));
        assert_eq!(handshake.connection_id, 1);
        assert_eq!(
            handshake.auth_plugin_data,
            vec![1u8, 2u8, 3u8, 4u8, 5u8, 6u8, 7u8, 8u8]
        );
        assert_eq!(handshake.capability_flags.bits(), 0x00008003);
    }

    #[test]
    fn should_parse_full_handshake_packet() {
        let mut payload = vec![
            0x0a_u8, b'5', b'.', b'7', b'.', b'4', b'4', b'-', b'l', b'o', b'g', 0u8, 1u8, 0u8,
            0u8, 0u8, 1u8, 2u8, 3u8, 4u8, 5u8, 6u8, 7u8, 8u8, 0u8, 3u8, 0x80_u8,
        ];
        payload.push(33u8);
        payload.extend_from_slice(&[2u8, 0u8]); // autocommit
        payload.extend_from_slice(&[0x08_u8, 0u8]);
        payload.push(0x15_u8);
        payload.extend_from_slice(&[0u8; 10]);
        payload.extend_from_slice(&[
            0x26_u8, 0x3a_u8, 0x34_u8, 0x34_u8, 0x46_u8, 0x44_u8, 0x63_u8, 0x44_u8, 0x69_u8,
            0x63_u8, 0x39_u8, 0x30_u8, 0x00_u8,
        ]);
        payload.extend_from_slice(&[1u8, 2u8, 3u8, 4u8, 5u8, 0u8]);
        let handshake = HandshakePacket::from_payload(&payload).unwrap();
        assert_eq!(handshake.protocol_version, 0x0a);
        assert_eq!(handshake.server_version, (5, 7, 44));
        assert_eq!(handshake.connection_id, 1);
        assert_eq!(
            handshake.auth_plugin_data,
            vec![
                1u8, 2u8, 3u8, 4u8, 5u8, 6u8, 7u8, 8u8, 0x26_u8, 0x3a_u8, 0x34_u8, 0x34_u8,
                0x46_u8, 0x44_u8, 0x63_u8, 0x44_u8, 0x69_u8, 0x63_u8, 0x39_u8, 0x30_u8,
            ]
        );
        assert_eq!(handshake.capability_flags.bits(), 0x00088003);
        assert_eq!(handshake.character_set, 33);
        assert_eq!(handshake.status_flags.bits(), 2);
        assert_eq!(handshake.auth_plugin_name, vec![1u8, 2u8, 3u8, 4u8, 5u8]);
    }

    #[test]
    fn should_parse_modern_column_descriptor() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"\x03def");
        payload.extend_from_slice(b"\x02db");
        payload.extend_from_slice(b"\x03tbl");
        payload.extend_from_slice(b"\x03tbl");
        payload.extend_from_slice(b"\x02id");
        payload.extend_from_slice(b"\x02id");
        payload.push(0x0c);
        payload.extend_from_slice(&[63, 0]); // binary charset
        payload.extend_from_slice(&[11, 0, 0, 0]); // length
        payload.push(0x08); // longlong
        payload.extend_from_slice(&[0x21, 0x00]); // not null + unsigned
        payload.push(0);
        payload.extend_from_slice(&[0, 0]); // filler
        let profile = ProtocolProfile::new((5, 7, 44), CapabilityFlags::CLIENT_PROTOCOL_41);
        let column = Column::from_payload(&payload, &profile).unwrap();
        assert_eq!(column.schema, b"db".to_vec());
        assert_eq!(column.name, b"id".to_vec());
        assert_eq!(column.character_set, 63);
        assert_eq!(column.column_length, 11);
        assert_eq!(column.column_type, ColumnType::MYSQL_TYPE_LONGLONG);
        assert!(column.flags.contains(ColumnFlags::UNSIGNED_FLAG));
    }

    #[test]
    fn should_parse_legacy_column_descriptor() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"\x03tbl");
        payload.extend_from_slice(b"\x02id");
        payload.push(3);
        payload.extend_from_slice(&[11, 0, 0]);
        payload.push(1);
        payload.push(0x08); // longlong
        payload.push(3);
        payload.extend_from_slice(&[0x21, 0x00]);
        payload.push(0);
        let profile = ProtocolProfile::new((3, 23, 58), CapabilityFlags::CLIENT_LONG_FLAG);
        let column = Column::from_payload(&payload, &profile).unwrap();
        assert_eq!(column.table, b"tbl".to_vec());
        assert_eq!(column.name, b"id".to_vec());
        assert_eq!(column.column_length, 11);
        assert_eq!(column.column_type, ColumnType::MYSQL_TYPE_LONGLONG);
        assert!(column.flags.contains(ColumnFlags::UNSIGNED_FLAG));
    }

    #[test]
    fn derived_properties_follow_type_flags_and_charset() {
        let mut column = Column {
            schema: Vec::new(),
            table: Vec::new(),
            org_table: Vec::new(),
            name: b"c".to_vec(),
            org_name: Vec::new(),
            column_length: 11,
            character_set: 63,
            column_type: ColumnType::MYSQL_TYPE_LONGLONG,
            flags: ColumnFlags::NUM_FLAG,
            decimals: 0,
        };
        assert!(column.is_numeric());
        assert!(!column.is_binary());
        assert!(!column.is_text());

        // A BLOB shares the binary charset but carries no NUM flag.
        column.column_type = ColumnType::MYSQL_TYPE_BLOB;
        column.flags = ColumnFlags::BLOB_FLAG;
        assert!(column.is_binary());
        assert!(!column.is_text());

        // TEXT is the same type code under a real charset.
        column.character_set = 33;
        assert!(column.is_text());
        assert!(!column.is_numeric());
    }
}

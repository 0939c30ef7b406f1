// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use bitflags::bitflags;

pub const MAX_PAYLOAD_LEN: usize = 16_777_215;
pub const UTF8_GENERAL_CI: u8 = 33;
/// Character set index the server assigns to pure binary columns.
pub const BINARY_CHARSET: u16 = 63;

/// Payloads at least this long are worth deflating on a compressed
/// connection; shorter ones ride in a passthrough frame.
pub const MIN_COMPRESS_LEN: usize = 50;

bitflags! {
    /// Server status flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u16 {
        const SERVER_STATUS_IN_TRANS             = 0x0001;
        const SERVER_STATUS_AUTOCOMMIT           = 0x0002;
        const SERVER_MORE_RESULTS_EXISTS         = 0x0008;
        const SERVER_STATUS_NO_GOOD_INDEX_USED   = 0x0010;
        const SERVER_STATUS_NO_INDEX_USED        = 0x0020;
        const SERVER_STATUS_CURSOR_EXISTS        = 0x0040;
        const SERVER_STATUS_LAST_ROW_SENT        = 0x0080;
        const SERVER_STATUS_DB_DROPPED           = 0x0100;
        const SERVER_STATUS_NO_BACKSLASH_ESCAPES = 0x0200;
        const SERVER_STATUS_METADATA_CHANGED     = 0x0400;
        const SERVER_QUERY_WAS_SLOW              = 0x0800;
        const SERVER_PT_OUT_PARAMS               = 0x1000;
    }
}

bitflags! {
    /// Capability flags (u32)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CapabilityFlags: u32 {
        const CLIENT_LONG_PASSWORD                  = 0x0000_0001;
        const CLIENT_FOUND_ROWS                     = 0x0000_0002;
        const CLIENT_LONG_FLAG                      = 0x0000_0004;
        const CLIENT_CONNECT_WITH_DB                = 0x0000_0008;
        const CLIENT_NO_SCHEMA                      = 0x0000_0010;
        const CLIENT_COMPRESS                       = 0x0000_0020;
        const CLIENT_ODBC                           = 0x0000_0040;
        const CLIENT_LOCAL_FILES                    = 0x0000_0080;
        const CLIENT_IGNORE_SPACE                   = 0x0000_0100;
        const CLIENT_PROTOCOL_41                    = 0x0000_0200;
        const CLIENT_INTERACTIVE                    = 0x0000_0400;
        const CLIENT_SSL                            = 0x0000_0800;
        const CLIENT_IGNORE_SIGPIPE                 = 0x0000_1000;
        const CLIENT_TRANSACTIONS                   = 0x0000_2000;
        const CLIENT_RESERVED                       = 0x0000_4000;
        const CLIENT_SECURE_CONNECTION              = 0x0000_8000;
        const CLIENT_MULTI_STATEMENTS               = 0x0001_0000;
        const CLIENT_MULTI_RESULTS                  = 0x0002_0000;
        const CLIENT_PS_MULTI_RESULTS               = 0x0004_0000;
        const CLIENT_PLUGIN_AUTH                    = 0x0008_0000;
        const CLIENT_CONNECT_ATTRS                  = 0x0010_0000;
        const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x0020_0000;
    }
}

bitflags! {
    /// Column flags (u16)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ColumnFlags: u16 {
        const NOT_NULL_FLAG         = 1;
        const PRI_KEY_FLAG          = 2;
        const UNIQUE_KEY_FLAG       = 4;
        const MULTIPLE_KEY_FLAG     = 8;
        const BLOB_FLAG             = 16;
        const UNSIGNED_FLAG         = 32;
        const ZEROFILL_FLAG         = 64;
        const BINARY_FLAG           = 128;
        const ENUM_FLAG             = 256;
        const AUTO_INCREMENT_FLAG   = 512;
        const TIMESTAMP_FLAG        = 1024;
        const SET_FLAG              = 2048;
        const NO_DEFAULT_VALUE_FLAG = 4096;
        const ON_UPDATE_NOW_FLAG    = 8192;
        const PART_KEY_FLAG         = 16384;
        const NUM_FLAG              = 32768;
    }
}

/// Commands (u8)
#[allow(non_camel_case_types)]
#[derive(Clone, Eq, PartialEq, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    COM_SLEEP = 0x00,
    COM_QUIT = 0x01,
    COM_INIT_DB = 0x02,
    COM_QUERY = 0x03,
    COM_FIELD_LIST = 0x04,
    COM_CREATE_DB = 0x05,
    COM_DROP_DB = 0x06,
    COM_REFRESH = 0x07,
    COM_SHUTDOWN = 0x08,
    COM_STATISTICS = 0x09,
    COM_PROCESS_INFO = 0x0a,
    COM_CONNECT = 0x0b,
    COM_PROCESS_KILL = 0x0c,
    COM_DEBUG = 0x0d,
    COM_PING = 0x0e,
    COM_TIME = 0x0f,
    COM_DELAYED_INSERT = 0x10,
    COM_CHANGE_USER = 0x11,
    COM_STMT_PREPARE = 0x16,
    COM_STMT_EXECUTE = 0x17,
    COM_STMT_SEND_LONG_DATA = 0x18,
    COM_STMT_CLOSE = 0x19,
    COM_STMT_RESET = 0x1a,
    COM_SET_OPTION = 0x1b,
    COM_STMT_FETCH = 0x1c,
    COM_RESET_CONNECTION = 0x1f,
}

/// Column types (u8)
#[allow(non_camel_case_types)]
#[derive(Clone, Eq, PartialEq, Copy, Debug)]
#[repr(u8)]
pub enum ColumnType {
    MYSQL_TYPE_DECIMAL = 0x00,
    MYSQL_TYPE_TINY = 0x01,
    MYSQL_TYPE_SHORT = 0x02,
    MYSQL_TYPE_LONG = 0x03,
    MYSQL_TYPE_FLOAT = 0x04,
    MYSQL_TYPE_DOUBLE = 0x05,
    MYSQL_TYPE_NULL = 0x06,
    MYSQL_TYPE_TIMESTAMP = 0x07,
    MYSQL_TYPE_LONGLONG = 0x08,
    MYSQL_TYPE_INT24 = 0x09,
    MYSQL_TYPE_DATE = 0x0a,
    MYSQL_TYPE_TIME = 0x0b,
    MYSQL_TYPE_DATETIME = 0x0c,
    MYSQL_TYPE_YEAR = 0x0d,
    MYSQL_TYPE_VARCHAR = 0x0f,
    MYSQL_TYPE_BIT = 0x10,
    MYSQL_TYPE_NEWDECIMAL = 0xf6,
    MYSQL_TYPE_ENUM = 0xf7,
    MYSQL_TYPE_SET = 0xf8,
    MYSQL_TYPE_TINY_BLOB = 0xf9,
    MYSQL_TYPE_MEDIUM_BLOB = 0xfa,
    MYSQL_TYPE_LONG_BLOB = 0xfb,
    MYSQL_TYPE_BLOB = 0xfc,
    MYSQL_TYPE_VAR_STRING = 0xfd,
    MYSQL_TYPE_STRING = 0xfe,
    MYSQL_TYPE_GEOMETRY = 0xff,
}

impl ColumnType {
    pub fn from_wire(x: u8) -> Option<ColumnType> {
        Some(match x {
            0x00 => ColumnType::MYSQL_TYPE_DECIMAL,
            0x01 => ColumnType::MYSQL_TYPE_TINY,
            0x02 => ColumnType::MYSQL_TYPE_SHORT,
            0x03 => ColumnType::MYSQL_TYPE_LONG,
            0x04 => ColumnType::MYSQL_TYPE_FLOAT,
            0x05 => ColumnType::MYSQL_TYPE_DOUBLE,
            0x06 => ColumnType::MYSQL_TYPE_NULL,
            0x07 => ColumnType::MYSQL_TYPE_TIMESTAMP,
            0x08 => ColumnType::MYSQL_TYPE_LONGLONG,
            0x09 => ColumnType::MYSQL_TYPE_INT24,
            0x0a => ColumnType::MYSQL_TYPE_DATE,
            0x0b => ColumnType::MYSQL_TYPE_TIME,
            0x0c => ColumnType::MYSQL_TYPE_DATETIME,
            0x0d => ColumnType::MYSQL_TYPE_YEAR,
            0x0f => ColumnType::MYSQL_TYPE_VARCHAR,
            0x10 => ColumnType::MYSQL_TYPE_BIT,
            0xf6 => ColumnType::MYSQL_TYPE_NEWDECIMAL,
            0xf7 => ColumnType::MYSQL_TYPE_ENUM,
            0xf8 => ColumnType::MYSQL_TYPE_SET,
            0xf9 => ColumnType::MYSQL_TYPE_TINY_BLOB,
            0xfa => ColumnType::MYSQL_TYPE_MEDIUM_BLOB,
            0xfb => ColumnType::MYSQL_TYPE_LONG_BLOB,
            0xfc => ColumnType::MYSQL_TYPE_BLOB,
            0xfd => ColumnType::MYSQL_TYPE_VAR_STRING,
            0xfe => ColumnType::MYSQL_TYPE_STRING,
            0xff => ColumnType::MYSQL_TYPE_GEOMETRY,
            _ => return None,
        })
    }

    pub fn is_numeric_type(self) -> bool {
        matches!(
            self,
            ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_FLOAT
                | ColumnType::MYSQL_TYPE_DOUBLE
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR
                | ColumnType::MYSQL_TYPE_DECIMAL
                | ColumnType::MYSQL_TYPE_NEWDECIMAL
        )
    }
}

/// Wire-format era of the connected server, fixed at handshake completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatEra {
    /// 3.2x and 4.0 servers: legacy scramble, short field descriptors.
    Pre41,
    /// Exactly 4.1.0: protocol-4.1 packet layouts, hybrid scramble.
    Original41,
    /// 4.1.1 up to 5.0: native SHA1 scramble.
    Secure411,
    /// 5.0 and later.
    Modern50,
}

impl FormatEra {
    pub fn from_version((major, minor, patch): (u16, u16, u16)) -> FormatEra {
        if major < 4 || (major == 4 && minor == 0) {
            FormatEra::Pre41
        } else if major == 4 && minor == 1 && patch == 0 {
            FormatEra::Original41
        } else if major == 4 {
            FormatEra::Secure411
        } else {
            FormatEra::Modern50
        }
    }

    pub fn is_41(self) -> bool {
        self >= FormatEra::Original41
    }
}

/// The negotiated shape of a connection: format era plus the capability
/// intersection. Built once when authentication completes and threaded
/// through every packet and value decoder instead of branching on raw
/// version numbers at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolProfile {
    pub era: FormatEra,
    pub capabilities: CapabilityFlags,
    pub server_version: (u16, u16, u16),
}

impl ProtocolProfile {
    pub fn new(server_version: (u16, u16, u16), capabilities: CapabilityFlags) -> ProtocolProfile {
        ProtocolProfile {
            era: FormatEra::from_version(server_version),
            capabilities,
            server_version,
        }
    }

    pub fn has_capability(&self, flag: CapabilityFlags) -> bool {
        self.capabilities.contains(flag)
    }

    /// Whether the login exchange may use the post-4.1 secure scramble.
    pub fn secure_auth(&self) -> bool {
        self.era >= FormatEra::Secure411
            && self.has_capability(CapabilityFlags::CLIENT_SECURE_CONNECTION)
    }
}

#[cfg(test)]
mod test {
    use super::{CapabilityFlags, FormatEra, ProtocolProfile};

    #[test]
    fn format_era_follows_server_version() {
        assert_eq!(FormatEra::from_version((3, 23, 58)), FormatEra::Pre41);
        assert_eq!(FormatEra::from_version((4, 0, 30)), FormatEra::Pre41);
        assert_eq!(FormatEra::from_version((4, 1, 0)), FormatEra::Original41);
        assert_eq!(FormatEra::from_version((4, 1, 22)), FormatEra::Secure411);
        assert_eq!(FormatEra::from_version((5, 0, 96)), FormatEra::Modern50);
        assert_eq!(FormatEra::from_version((8, 0, 36)), FormatEra::Modern50);
    }

    #[test]
    fn secure_auth_requires_both_era_and_capability() {
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_SECURE_CONNECTION;
        assert!(ProtocolProfile::new((5, 7, 44), caps).secure_auth());
        assert!(!ProtocolProfile::new((4, 1, 0), caps).secure_auth());
        let downgraded = CapabilityFlags::CLIENT_PROTOCOL_41;
        assert!(!ProtocolProfile::new((5, 7, 44), downgraded).secure_auth());
    }
}

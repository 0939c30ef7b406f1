// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::fmt::Write as FmtWrite;
use std::io;
use std::io::Write as StdWrite;

use byteorder::LittleEndian as LE;
use byteorder::WriteBytesExt;

use crate::consts::ColumnFlags;
use crate::error::DriverError::MissingNamedParameter;
use crate::error::Error::DriverError;
use crate::error::Result as MyResult;
use crate::io::{Read, Write};
use crate::packet::Column;

use self::Value::{Bytes, Date, Float, Int, Time, UInt, NULL};

#[derive(Clone, PartialEq, PartialOrd, Debug)]
pub enum Value {
    NULL,
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// year, month, day, hour, minutes, seconds, micro seconds
    Date(u16, u8, u8, u8, u8, u8, u32),
    /// is negative, days, hours, minutes, seconds, micro seconds
    Time(bool, u32, u8, u8, u8, u32),
}

impl Value {
    /// Get correct string representation of a mysql value for use in a text
    /// protocol query. Strings arrive quoted and escaped, non-utf8 blobs as a
    /// hex literal.
    pub fn into_str(&self) -> String {
        match *self {
            NULL => "NULL".into(),
            Bytes(ref x) => match std::str::from_utf8(x) {
                Ok(s) => {
                    let mut escaped = String::with_capacity(s.len() + 2);
                    escaped.push('\'');
                    for c in s.chars() {
                        match c {
                            '\x00' => escaped.push_str("\\0"),
                            '\n' => escaped.push_str("\\n"),
                            '\r' => escaped.push_str("\\r"),
                            '\\' => escaped.push_str("\\\\"),
                            '\'' => escaped.push_str("\\'"),
                            '"' => escaped.push_str("\\\""),
                            '\x1a' => escaped.push_str("\\Z"),
                            c => escaped.push(c),
                        }
                    }
                    escaped.push('\'');
                    escaped
                }
                Err(_) => {
                    let mut s = String::from("0x");
                    for c in x.iter() {
                        let _ = write!(s, "{:02X}", *c);
                    }
                    s
                }
            },
            Int(x) => format!("{}", x),
            UInt(x) => format!("{}", x),
            Float(x) => format!("{}", x),
            Date(0, 0, 0, 0, 0, 0, 0) => "''".into(),
            Date(y, m, d, 0, 0, 0, 0) => format!("'{:04}-{:02}-{:02}'", y, m, d),
            Date(y, m, d, h, i, s, 0) => {
                format!("'{:04}-{:02}-{:02} {:02}:{:02}:{:02}'", y, m, d, h, i, s)
            }
            Date(y, m, d, h, i, s, u) => format!(
                "'{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}'",
                y, m, d, h, i, s, u
            ),
            Time(_, 0, 0, 0, 0, 0) => "''".into(),
            Time(neg, d, h, i, s, 0) => {
                if neg {
                    format!("'-{} {:03}:{:02}:{:02}'", d, h, i, s)
                } else {
                    format!("'{} {:03}:{:02}:{:02}'", d, h, i, s)
                }
            }
            Time(neg, d, h, i, s, u) => {
                if neg {
                    format!("'-{} {:03}:{:02}:{:02}.{:06}'", d, h, i, s, u)
                } else {
                    format!("'{} {:03}:{:02}:{:02}.{:06}'", d, h, i, s, u)
                }
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(*self, NULL)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            Bytes(ref x) => Some(&x[..]),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Int(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match *self {
            UInt(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Float(x) => Some(x),
            _ => None,
        }
    }

    /// Binary protocol encoding of one value, without the type tag.
    pub fn to_bin(&self) -> io::Result<Vec<u8>> {
        let mut writer = Vec::with_capacity(256);
        match *self {
            NULL => (),
            Bytes(ref x) => writer.write_lenenc_bytes(&x[..])?,
            Int(x) => writer.write_i64::<LE>(x)?,
            UInt(x) => writer.write_u64::<LE>(x)?,
            Float(x) => writer.write_f64::<LE>(x)?,
            Date(0u16, 0u8, 0u8, 0u8, 0u8, 0u8, 0u32) => writer.write_u8(0u8)?,
            Date(y, m, d, 0u8, 0u8, 0u8, 0u32) => {
                writer.write_u8(4u8)?;
                writer.write_u16::<LE>(y)?;
                writer.write_u8(m)?;
                writer.write_u8(d)?;
            }
            Date(y, m, d, h, i, s, 0u32) => {
                writer.write_u8(7u8)?;
                writer.write_u16::<LE>(y)?;
                writer.write_u8(m)?;
                writer.write_u8(d)?;
                writer.write_u8(h)?;
                writer.write_u8(i)?;
                writer.write_u8(s)?;
            }
            Date(y, m, d, h, i, s, u) => {
                writer.write_u8(11u8)?;
                writer.write_u16::<LE>(y)?;
                writer.write_u8(m)?;
                writer.write_u8(d)?;
                writer.write_u8(h)?;
                writer.write_u8(i)?;
                writer.write_u8(s)?;
                writer.write_u32::<LE>(u)?;
            }
            Time(_, 0u32, 0u8, 0u8, 0u8, 0u32) => writer.write_u8(0u8)?,
            Time(neg, d, h, m, s, 0u32) => {
                writer.write_u8(8u8)?;
                writer.write_u8(if neg { 1u8 } else { 0u8 })?;
                writer.write_u32::<LE>(d)?;
                writer.write_u8(h)?;
                writer.write_u8(m)?;
                writer.write_u8(s)?;
            }
            Time(neg, d, h, m, s, u) => {
                writer.write_u8(12u8)?;
                writer.write_u8(if neg { 1u8 } else { 0u8 })?;
                writer.write_u32::<LE>(d)?;
                writer.write_u8(h)?;
                writer.write_u8(m)?;
                writer.write_u8(s)?;
                writer.write_u32::<LE>(u)?;
            }
        };
        Ok(writer)
    }

    /// Text protocol row. Every cell is a lenenc string, a NULL cell is the
    /// 0xfb sentinel byte.
    pub fn from_payload(pld: &[u8], columns_count: usize) -> io::Result<Vec<Value>> {
        let mut output = Vec::with_capacity(columns_count);
        let mut reader = pld;
        while !reader.is_empty() {
            if reader[0] == 0xfb_u8 {
                reader = &reader[1..];
                output.push(NULL);
            } else {
                output.push(Bytes(reader.read_lenenc_bytes()?));
            }
        }
        Ok(output)
    }

    /// Binary protocol row. The null bitmap starts at bit offset 2 on the
    /// read path.
    pub fn from_bin_payload(pld: &[u8], columns: &[Column]) -> io::Result<Vec<Value>> {
        let bit_offset = 2; // http://dev.mysql.com/doc/internals/en/null-bitmap.html
        let bitmap_len = (columns.len() + 7 + bit_offset) / 8;
        if pld.len() < 1 + bitmap_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "binary row shorter than its null bitmap",
            ));
        }
        let mut bitmap = Vec::with_capacity(bitmap_len);
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..bitmap_len {
            bitmap.push(pld[i + 1]);
        }
        let mut reader = &pld[1 + bitmap_len..];
        for (i, column) in columns.iter().enumerate() {
            if bitmap[(i + bit_offset) / 8] & (1 << ((i + bit_offset) % 8)) == 0 {
                values.push(reader.read_bin_value(
                    column.column_type,
                    column.flags.contains(ColumnFlags::UNSIGNED_FLAG),
                )?);
            } else {
                values.push(NULL);
            }
        }
        Ok(values)
    }

    /// (NULL-bitmap, values, ids of fields to send through send_long_data)
    pub fn to_bin_payload(
        params: &[Column],
        values: &[Value],
        max_allowed_packet: usize,
    ) -> io::Result<(Vec<u8>, Vec<u8>, Option<Vec<u16>>)> {
        let bitmap_len = (params.len() + 7) / 8;
        let mut large_ids = Vec::new();
        let mut writer = Vec::new();
        let mut bitmap = vec![0u8; bitmap_len];
        let mut written = 0;
        let cap = max_allowed_packet
            .saturating_sub(bitmap_len)
            .saturating_sub(values.len() * 8);
        for (i, value) in values.iter().enumerate() {
            match *value {
                NULL => bitmap[i / 8] |= 1 << (i % 8),
                _ => {
                    let val = value.to_bin()?;
                    if val.len() < cap - written {
                        written += val.len();
                        writer.write_all(&val[..])?;
                    } else {
                        large_ids.push(i as u16);
                    }
                }
            }
        }
        if large_ids.is_empty() {
            Ok((bitmap, writer, None))
        } else {
            Ok((bitmap, writer, Some(large_ids)))
        }
    }
}

impl From<i8> for Value {
    fn from(x: i8) -> Value {
        Int(x as i64)
    }
}

impl From<i16> for Value {
    fn from(x: i16) -> Value {
        Int(x as i64)
    }
}

impl From<i32> for Value {
    fn from(x: i32) -> Value {
        Int(x as i64)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Value {
        Int(x)
    }
}

impl From<isize> for Value {
    fn from(x: isize) -> Value {
        Int(x as i64)
    }
}

impl From<u8> for Value {
    fn from(x: u8) -> Value {
        Int(x as i64)
    }
}

impl From<u16> for Value {
    fn from(x: u16) -> Value {
        Int(x as i64)
    }
}

impl From<u32> for Value {
    fn from(x: u32) -> Value {
        Int(x as i64)
    }
}

impl From<u64> for Value {
    fn from(x: u64) -> Value {
        UInt(x)
    }
}

impl From<usize> for Value {
    fn from(x: usize) -> Value {
        UInt(x as u64)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Value {
        Float(x as f64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Float(x)
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Value {
        Int(if x { 1 } else { 0 })
    }
}

impl From<String> for Value {
    fn from(x: String) -> Value {
        Bytes(x.into_bytes())
    }
}

impl<'a> From<&'a str> for Value {
    fn from(x: &'a str) -> Value {
        Bytes(x.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(x: Vec<u8>) -> Value {
        Bytes(x)
    }
}

impl<'a> From<&'a [u8]> for Value {
    fn from(x: &'a [u8]) -> Value {
        Bytes(x.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(x: Option<T>) -> Value {
        match x {
            Some(x) => x.into(),
            None => NULL,
        }
    }
}

/// Statement parameters.
#[derive(Clone, PartialEq, Debug)]
pub enum Params {
    Empty,
    Positional(Vec<Value>),
    Named(HashMap<String, Value>),
}

impl Params {
    /// Rewrites named parameters into positional order using the name list
    /// recorded when the statement text was parsed. A name may appear more
    /// than once.
    pub fn into_positional(self, named_params: &[String]) -> MyResult<Params> {
        match self {
            Params::Named(map) => {
                let mut values = Vec::with_capacity(named_params.len());
                for name in named_params {
                    match map.get(name) {
                        Some(value) => values.push(value.clone()),
                        None => return Err(DriverError(MissingNamedParameter(name.clone()))),
                    }
                }
                Ok(Params::Positional(values))
            }
            x => Ok(x),
        }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Params {
        Params::Empty
    }
}

impl<T: Into<Value>> From<Vec<T>> for Params {
    fn from(x: Vec<T>) -> Params {
        let values: Vec<Value> = x.into_iter().map(Into::into).collect();
        if values.is_empty() {
            Params::Empty
        } else {
            Params::Positional(values)
        }
    }
}

impl From<HashMap<String, Value>> for Params {
    fn from(x: HashMap<String, Value>) -> Params {
        Params::Named(x)
    }
}

macro_rules! into_params_impl {
    ($([$A:ident, $a:ident]),*) => {
        impl<$($A: Into<Value>,)*> From<($($A,)*)> for Params {
            fn from(($($a,)*): ($($A,)*)) -> Params {
                Params::Positional(vec![$($a.into(),)*])
            }
        }
    };
}

into_params_impl!([A, a]);
into_params_impl!([A, a], [B, b]);
into_params_impl!([A, a], [B, b], [C, c]);
into_params_impl!([A, a], [B, b], [C, c], [D, d]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g], [H, h]);

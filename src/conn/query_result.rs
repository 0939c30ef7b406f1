// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use crate::consts::StatusFlags;
use crate::error::Result as MyResult;
use crate::packet::{Column, OkPacket};
use crate::value::Value;

use super::Conn;

/// Result of a query or statement execution, for both the text and the
/// binary protocol.
///
/// Iterating yields rows; the borrowed connection stays locked to this
/// result set until it is dropped. Dropping a half read result drains the
/// remaining rows so the connection is left in sync.
#[derive(Debug)]
pub struct QueryResult<'a> {
    conn: &'a mut Conn,
    columns: Vec<Column>,
    ok_packet: Option<OkPacket>,
    is_bin: bool,
}

impl<'a> QueryResult<'a> {
    pub(crate) fn new(
        conn: &'a mut Conn,
        columns: Vec<Column>,
        ok_packet: Option<OkPacket>,
        is_bin: bool,
    ) -> QueryResult<'a> {
        QueryResult {
            conn,
            columns,
            ok_packet,
            is_bin,
        }
    }

    fn handle_if_more_results(&mut self) -> Option<MyResult<Vec<Value>>> {
        if self
            .conn
            .status_flags
            .contains(StatusFlags::SERVER_MORE_RESULTS_EXISTS)
        {
            match self.conn.handle_result_set() {
                Ok((cols, ok_packet)) => {
                    self.columns = cols;
                    self.ok_packet = ok_packet;
                    None
                }
                Err(e) => Some(Err(e)),
            }
        } else {
            None
        }
    }

    /// Affected rows reported by the last OK packet.
    pub fn affected_rows(&self) -> u64 {
        self.conn.affected_rows
    }

    /// Last insert id reported by the last OK packet.
    pub fn last_insert_id(&self) -> u64 {
        self.conn.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.ok_packet.as_ref().map(|ok| ok.warnings).unwrap_or(0)
    }

    pub fn info(&self) -> Vec<u8> {
        self.ok_packet
            .as_ref()
            .map(|ok| ok.info.clone())
            .unwrap_or_default()
    }

    pub fn columns_ref(&self) -> &[Column] {
        &self.columns
    }

    /// Index of a result's column by name.
    pub fn column_index<T: AsRef<str>>(&self, name: T) -> Option<usize> {
        let name = name.as_ref().as_bytes();
        self.columns.iter().position(|c| c.name == name)
    }

    /// Whether another result set follows this one, from a multi statement
    /// query or a stored procedure call.
    pub fn more_results_exists(&self) -> bool {
        self.conn.has_results
    }
}

impl<'a> Iterator for QueryResult<'a> {
    type Item = MyResult<Vec<Value>>;

    fn next(&mut self) -> Option<MyResult<Vec<Value>>> {
        let r = if self.is_bin {
            self.conn.next_bin(&self.columns)
        } else {
            self.conn.next_text(&self.columns)
        };
        match r {
            Ok(None) => self.handle_if_more_results(),
            Ok(Some(row)) => Some(Ok(row)),
            Err(e) => Some(Err(e)),
        }
    }
}

impl<'a> Drop for QueryResult<'a> {
    fn drop(&mut self) {
        while self.conn.has_results {
            while let Some(_) = self.next() {}
        }
    }
}

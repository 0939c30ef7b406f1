// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::io;
use std::io::Write as _;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::consts::{ColumnType, Command};
use crate::error::Result as MyResult;
use crate::packet::Column;
use crate::value::{Params, Value};

use super::query_result::QueryResult;
use super::Conn;

/// Server side of a prepared statement, parsed from the PREPARE response.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct InnerStmt {
    pub(crate) params: Option<Vec<Column>>,
    pub(crate) columns: Option<Vec<Column>>,
    pub(crate) statement_id: u32,
    pub(crate) num_columns: u16,
    pub(crate) num_params: u16,
    pub(crate) warning_count: u16,
    pub(crate) named_params: Option<Vec<String>>,
}

impl InnerStmt {
    pub(crate) fn from_payload(pld: &[u8], named_params: Option<Vec<String>>) -> io::Result<InnerStmt> {
        let mut reader = pld;
        reader.read_u8()?;
        let statement_id = reader.read_u32::<LE>()?;
        let num_columns = reader.read_u16::<LE>()?;
        let num_params = reader.read_u16::<LE>()?;
        // filler
        reader.read_u8()?;
        let warning_count = reader.read_u16::<LE>()?;
        Ok(InnerStmt {
            params: None,
            columns: None,
            statement_id,
            num_columns,
            num_params,
            warning_count,
            named_params,
        })
    }
}

/// Builds the COM_STMT_EXECUTE payload: statement id, flags, iteration
/// count, the null bitmap, the per-parameter wire type codes and the binary
/// values. Parameters that were too large for the packet budget are left
/// out of the values block and their indices are returned so the caller can
/// upload them with COM_STMT_SEND_LONG_DATA first.
pub(crate) fn build_execute_payload(
    stmt: &InnerStmt,
    params: &[Value],
    max_allowed_packet: usize,
) -> io::Result<(Vec<u8>, Option<Vec<u16>>)> {
    let mut writer: Vec<u8>;
    let mut large_ids = None;
    match stmt.params {
        Some(ref sparams) => {
            let (bitmap, values, ids) = Value::to_bin_payload(sparams, params, max_allowed_packet)?;
            large_ids = ids;
            writer = Vec::with_capacity(10 + bitmap.len() + params.len() * 2 + values.len());
            writer.write_u32::<LE>(stmt.statement_id)?;
            writer.write_u8(0u8)?;
            writer.write_u32::<LE>(1u32)?;
            writer.write_all(&bitmap)?;
            writer.write_u8(1u8)?;
            for (i, param) in params.iter().enumerate() {
                match *param {
                    Value::NULL => {
                        writer.write_all(&[sparams[i].column_type as u8, 0u8])?
                    }
                    Value::Bytes(..) => {
                        writer.write_all(&[ColumnType::MYSQL_TYPE_VAR_STRING as u8, 0u8])?
                    }
                    Value::Int(..) => {
                        writer.write_all(&[ColumnType::MYSQL_TYPE_LONGLONG as u8, 0u8])?
                    }
                    Value::UInt(..) => {
                        writer.write_all(&[ColumnType::MYSQL_TYPE_LONGLONG as u8, 128u8])?
                    }
                    Value::Float(..) => {
                        writer.write_all(&[ColumnType::MYSQL_TYPE_DOUBLE as u8, 0u8])?
                    }
                    Value::Date(..) => {
                        writer.write_all(&[ColumnType::MYSQL_TYPE_DATE as u8, 0u8])?
                    }
                    Value::Time(..) => {
                        writer.write_all(&[ColumnType::MYSQL_TYPE_TIME as u8, 0u8])?
                    }
                }
            }
            writer.write_all(&values)?;
        }
        None => {
            writer = Vec::with_capacity(9);
            writer.write_u32::<LE>(stmt.statement_id)?;
            writer.write_u8(0u8)?;
            writer.write_u32::<LE>(1u32)?;
        }
    }
    Ok((writer, large_ids))
}

/// Mysql
/// [prepared statement](https://dev.mysql.com/doc/internals/en/prepared-statements.html).
#[derive(Debug)]
pub struct Stmt<'a> {
    conn: &'a mut Conn,
    stmt: InnerStmt,
}

impl<'a> Stmt<'a> {
    pub(crate) fn new(stmt: InnerStmt, conn: &'a mut Conn) -> Stmt<'a> {
        Stmt { conn, stmt }
    }

    /// Statement's parameter descriptors, if any.
    pub fn params_ref(&self) -> Option<&[Column]> {
        self.stmt.params.as_deref()
    }

    /// Statement's column descriptors, if any.
    pub fn columns_ref(&self) -> Option<&[Column]> {
        self.stmt.columns.as_deref()
    }

    /// Index of a statement's column by name.
    pub fn column_index<T: AsRef<str>>(&self, name: T) -> Option<usize> {
        match self.stmt.columns {
            None => None,
            Some(ref columns) => {
                let name = name.as_ref().as_bytes();
                columns.iter().position(|c| c.name == name)
            }
        }
    }

    pub fn warnings(&self) -> u16 {
        self.stmt.warning_count
    }

    /// Executes the prepared statement.
    pub fn execute<T: Into<Params>>(&mut self, params: T) -> MyResult<QueryResult<'_>> {
        self.conn.execute(&self.stmt, params.into())
    }
}

impl<'a> Drop for Stmt<'a> {
    fn drop(&mut self) {
        // Fire and forget, the server sends no reply to COM_STMT_CLOSE.
        let data = self.stmt.statement_id.to_le_bytes();
        let _ = self.conn.write_command_data(Command::COM_STMT_CLOSE, &data);
    }
}

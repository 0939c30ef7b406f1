// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::io::Read as _;
use std::time::{Duration, Instant};

use byteorder::{WriteBytesExt, LE};
use log::debug;

use crate::consts::{self, CapabilityFlags, Command, ColumnType, ProtocolProfile, StatusFlags};
use crate::error::DriverError::{
    MismatchedStmtParams, NamedParamsForPositionalQuery, OldScrambleDisabled, SetupError,
    UnexpectedPacket,
};
use crate::error::Error::DriverError;
use crate::error::Result as MyResult;
use crate::io::Read as _;
use crate::io::Stream;
use crate::io::Write as _;
use crate::named_params::parse_named_params;
use crate::packet::{self, Column, EofPacket, ErrPacket, OkPacket};
use crate::scramble::{scramble_323, scramble_410, scramble_native};
use crate::value::{Params, Value};

pub mod handshake;
pub mod opts;
pub mod pool;
pub mod proc_cache;
pub mod query_result;
pub mod stmt;

pub use self::opts::{Opts, OptsBuilder};
#[cfg(feature = "native-tls")]
pub use self::opts::SslOpts;
pub use self::proc_cache::ProcMetadata;
pub use self::query_result::QueryResult;
pub use self::stmt::Stmt;

use self::handshake::{AuthOutcome, Negotiator};
use self::proc_cache::ProcCache;
use self::stmt::{build_execute_payload, InnerStmt};

/// Mysql connection.
#[derive(Debug)]
pub struct Conn {
    opts: Opts,
    stream: Option<Stream>,
    profile: Option<ProtocolProfile>,
    affected_rows: u64,
    last_insert_id: u64,
    max_allowed_packet: usize,
    connection_id: u32,
    status_flags: StatusFlags,
    seq_id: u8,
    character_set: u8,
    connected: bool,
    has_results: bool,
    auth_seed: Vec<u8>,
    proc_cache: ProcCache,
    birth: Instant,
}

impl Conn {
    fn empty(opts: Opts) -> Conn {
        Conn {
            proc_cache: ProcCache::new(opts.get_proc_cache_size()),
            opts,
            stream: None,
            profile: None,
            affected_rows: 0,
            last_insert_id: 0,
            max_allowed_packet: consts::MAX_PAYLOAD_LEN,
            connection_id: 0,
            status_flags: StatusFlags::empty(),
            seq_id: 0,
            character_set: 0,
            connected: false,
            has_results: false,
            auth_seed: Vec::new(),
            birth: Instant::now(),
        }
    }

    /// Creates a new connection.
    ///
    /// When the server runs on the same host the driver will silently
    /// reconnect through its socket (or named pipe) unless `prefer_socket`
    /// was turned off.
    pub fn new<T: Into<Opts>>(opts: T) -> MyResult<Conn> {
        let mut conn = Conn::empty(opts.into());
        conn.connect_stream()?;
        conn.connect()?;
        let may_upgrade = !conn.opts.ssl_enabled()
            && conn.opts.get_socket().is_none()
            && conn.opts.get_prefer_socket()
            && conn.opts.addr_is_loopback();
        if may_upgrade {
            if let Some(path) = conn.get_system_var("socket") {
                let path = path.as_bytes().unwrap_or(&[]).to_vec();
                if !path.is_empty() {
                    let mut builder = OptsBuilder::from_opts(conn.opts.clone());
                    builder.socket(Some(String::from_utf8_lossy(&path).into_owned()));
                    return Conn::new(Opts::from(builder)).or(Ok(conn));
                }
            }
        }
        Ok(conn)
    }

    fn connect_stream(&mut self) -> MyResult<()> {
        let stream = if let Some(socket) = self.opts.get_socket() {
            debug!("connecting through socket `{}'", socket);
            Stream::connect_socket(
                socket,
                self.opts.get_read_timeout(),
                self.opts.get_write_timeout(),
            )?
        } else {
            debug!(
                "connecting to {}:{}",
                self.opts.get_ip_or_hostname(),
                self.opts.get_tcp_port()
            );
            Stream::connect_tcp(
                self.opts.get_ip_or_hostname(),
                self.opts.get_tcp_port(),
                self.opts.get_read_timeout(),
                self.opts.get_write_timeout(),
                self.opts
                    .get_tcp_keepalive_time_ms()
                    .map(|ms| Duration::from_millis(u64::from(ms))),
                self.opts.get_tcp_connect_timeout(),
                self.opts.get_tcp_nodelay(),
                self.opts.get_bind_address().copied(),
            )?
        };
        self.stream = Some(stream);
        Ok(())
    }

    fn profile(&self) -> ProtocolProfile {
        self.profile
            .unwrap_or_else(|| ProtocolProfile::new((0, 0, 0), CapabilityFlags::empty()))
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn server_version(&self) -> (u16, u16, u16) {
        self.profile().server_version
    }

    pub fn status_flags(&self) -> StatusFlags {
        self.status_flags
    }

    /// Character set index announced by the server greeting.
    pub fn character_set(&self) -> u8 {
        self.character_set
    }

    pub(crate) fn expired(&self, ttl: Duration) -> bool {
        self.birth.elapsed() > ttl
    }

    /// Drops the stream and forgets any in-flight state. After this the
    /// connection only reports `server_disconnected` until reconnected.
    fn disconnect(&mut self) {
        self.stream = None;
        self.connected = false;
        self.has_results = false;
    }

    /// Turns an ERR payload into an error value, tearing the session down
    /// when the server reports a code it will not recover from.
    fn server_error(&mut self, pld: &[u8]) -> crate::error::Error {
        match ErrPacket::from_payload(pld) {
            Ok(err) => {
                let err = err.into_mysql_error();
                if err.is_fatal() {
                    self.disconnect();
                }
                err.into()
            }
            Err(e) => {
                self.disconnect();
                e
            }
        }
    }

    fn read_packet(&mut self) -> MyResult<Vec<u8>> {
        let seq_id = self.seq_id;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(crate::error::Error::server_disconnected)?;
        match stream.read_packet(seq_id) {
            Ok((data, seq_id)) => {
                self.seq_id = seq_id;
                Ok(data)
            }
            // A short read or an out-of-sync frame leaves the stream in an
            // unknown position, so the session cannot continue on it.
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    fn write_packet(&mut self, data: &[u8]) -> MyResult<()> {
        let seq_id = self.seq_id;
        let max_allowed_packet = self.max_allowed_packet;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(crate::error::Error::server_disconnected)?;
        match stream.write_packet(data, seq_id, max_allowed_packet) {
            Ok(seq_id) => {
                self.seq_id = seq_id;
                Ok(())
            }
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    fn drop_packet(&mut self) -> MyResult<()> {
        let seq_id = self.seq_id;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(crate::error::Error::server_disconnected)?;
        match stream.drop_packet(seq_id) {
            Ok(seq_id) => {
                self.seq_id = seq_id;
                Ok(())
            }
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    fn handle_ok(&mut self, ok: &OkPacket) {
        self.affected_rows = ok.affected_rows;
        self.last_insert_id = ok.last_insert_id;
        self.status_flags = ok.status_flags;
    }

    fn handle_eof(&mut self, eof: &EofPacket) {
        self.status_flags = eof.status_flags;
    }

    fn do_handshake(&mut self) -> MyResult<()> {
        let opts = self.opts.clone();
        let mut negotiator = Negotiator::new(&opts);

        let pld = self.read_packet()?;
        negotiator.handle_greeting(&pld)?;
        let profile = negotiator
            .profile()
            .ok_or(DriverError(UnexpectedPacket))?;
        self.profile = Some(profile);
        self.connection_id = negotiator.connection_id();
        self.character_set = negotiator.character_set();
        self.auth_seed = negotiator.seed().to_vec();

        #[cfg(feature = "native-tls")]
        if negotiator.wants_tls() {
            // Two phase capability send: plaintext request, TLS upgrade,
            // then the full login packet over the encrypted channel.
            self.write_packet(&negotiator.ssl_request_payload())?;
            if let (Some(stream), Some(ssl_opts)) =
                (self.stream.take(), self.opts.get_ssl_opts())
            {
                self.stream =
                    Some(stream.make_secure(self.opts.get_ip_or_hostname(), ssl_opts)?);
            }
        }

        let pld = negotiator.auth_payload()?;
        self.write_packet(&pld)?;
        loop {
            let pld = self.read_packet()?;
            match negotiator.handle_auth_response(&pld)? {
                AuthOutcome::Accepted(ok) => {
                    self.handle_ok(&ok);
                    break;
                }
                AuthOutcome::Resend(pld) => self.write_packet(&pld)?,
            }
        }

        if profile.has_capability(CapabilityFlags::CLIENT_COMPRESS) {
            debug!("switching to the compressed protocol");
            if let Some(stream) = self.stream.take() {
                self.stream = Some(stream.make_compressed());
            }
        }
        Ok(())
    }

    fn connect(&mut self) -> MyResult<()> {
        if self.connected {
            return Ok(());
        }
        self.do_handshake()?;
        let max_allowed_packet = match self.get_system_var("max_allowed_packet") {
            Some(Value::Int(x)) if x > 0 => x as usize,
            Some(Value::UInt(x)) => x as usize,
            Some(Value::Bytes(ref bytes)) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            _ => 0,
        };
        if max_allowed_packet == 0 {
            return Err(DriverError(SetupError));
        }
        self.max_allowed_packet = max_allowed_packet;
        self.connected = true;
        for cmd in self.opts.get_init().to_vec() {
            self.query(&cmd)?;
        }
        Ok(())
    }

    fn write_command(&mut self, cmd: Command) -> MyResult<()> {
        self.seq_id = 0;
        if let Some(ref mut stream) = self.stream {
            stream.reset_compressed_seq_id();
        }
        self.write_packet(&[cmd as u8])
    }

    fn write_command_data(&mut self, cmd: Command, data: &[u8]) -> MyResult<()> {
        self.seq_id = 0;
        if let Some(ref mut stream) = self.stream {
            stream.reset_compressed_seq_id();
        }
        let mut writer = Vec::with_capacity(1 + data.len());
        writer.push(cmd as u8);
        writer.extend_from_slice(data);
        self.write_packet(&writer)
    }

    /// Executes COM_PING. Returns `true` on success.
    pub fn ping(&mut self) -> bool {
        match self.write_command(Command::COM_PING) {
            Ok(_) => match self.read_packet() {
                Ok(ref pld) if packet::is_ok_packet(pld) => {
                    if let Ok(ok) = OkPacket::from_payload(pld, self.profile().era) {
                        self.handle_ok(&ok);
                    }
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Executes COM_INIT_DB. Returns `true` on success.
    pub fn select_db(&mut self, db_name: &str) -> bool {
        match self.write_command_data(Command::COM_INIT_DB, db_name.as_bytes()) {
            Ok(_) => match self.read_packet() {
                Ok(ref pld) if packet::is_ok_packet(pld) => {
                    if let Ok(ok) = OkPacket::from_payload(pld, self.profile().era) {
                        self.handle_ok(&ok);
                    }
                    let mut builder = OptsBuilder::from_opts(self.opts.clone());
                    builder.db_name(Some(db_name));
                    self.opts = builder.into();
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Executes COM_CHANGE_USER, swapping the session identity without
    /// tearing down the transport.
    pub fn change_user(
        &mut self,
        user: Option<String>,
        pass: Option<String>,
        db_name: Option<String>,
    ) -> MyResult<()> {
        let mut builder = OptsBuilder::from_opts(self.opts.clone());
        builder.user(user).pass(pass).db_name(db_name);
        let opts: Opts = builder.into();

        let profile = self.profile();
        let pass_bytes = opts.get_pass().unwrap_or("").as_bytes().to_vec();
        let scramble_buf = self.scramble_for(&opts, &pass_bytes)?;

        let mut writer = Vec::new();
        writer.extend_from_slice(opts.get_user().unwrap_or("").as_bytes());
        writer.push(0);
        if profile.has_capability(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
            match scramble_buf {
                Some(ref scr) => {
                    writer.push(scr.len() as u8);
                    writer.extend_from_slice(scr);
                }
                None => writer.push(0),
            }
        } else {
            if let Some(ref scr) = scramble_buf {
                writer.extend_from_slice(scr);
            }
            writer.push(0);
        }
        writer.extend_from_slice(opts.get_db_name().unwrap_or("").as_bytes());
        writer.push(0);
        if profile.era.is_41() {
            writer.write_u16::<LE>(u16::from(consts::UTF8_GENERAL_CI))?;
        }
        self.write_command_data(Command::COM_CHANGE_USER, &writer)?;

        let pld = self.read_packet()?;
        if packet::is_eof_packet(&pld) {
            // Old password request, same retry as during login.
            if opts.get_secure_auth() {
                return Err(DriverError(OldScrambleDisabled));
            }
            let head = &self.auth_seed[..self.auth_seed.len().min(8)];
            let mut retry = if pass_bytes.is_empty() {
                Vec::new()
            } else {
                scramble_323(head, &pass_bytes)
            };
            retry.push(0);
            self.write_packet(&retry)?;
            let pld = self.read_packet()?;
            self.expect_ok(&pld)?;
        } else {
            self.expect_ok(&pld)?;
        }
        self.opts = opts;
        Ok(())
    }

    fn expect_ok(&mut self, pld: &[u8]) -> MyResult<()> {
        if packet::is_ok_packet(pld) {
            let ok = OkPacket::from_payload(pld, self.profile().era)?;
            self.handle_ok(&ok);
            Ok(())
        } else if packet::is_err_packet(pld) {
            Err(self.server_error(pld))
        } else {
            Err(DriverError(UnexpectedPacket))
        }
    }

    fn scramble_for(&self, opts: &Opts, pass: &[u8]) -> MyResult<Option<Vec<u8>>> {
        if pass.is_empty() {
            return Ok(None);
        }
        let profile = self.profile();
        match profile.era {
            consts::FormatEra::Pre41 => Ok(Some(scramble_323(&self.auth_seed, pass))),
            consts::FormatEra::Original41 => Ok(scramble_410(&self.auth_seed, pass)),
            _ => {
                if profile.secure_auth() {
                    Ok(scramble_native(&self.auth_seed, pass).map(|x| x.to_vec()))
                } else if opts.get_secure_auth() {
                    Err(DriverError(OldScrambleDisabled))
                } else {
                    Ok(Some(scramble_323(&self.auth_seed, pass)))
                }
            }
        }
    }

    fn send_local_infile(&mut self, file_name: &[u8]) -> MyResult<Option<OkPacket>> {
        let path = String::from_utf8_lossy(file_name).into_owned();
        debug!("server requested local file `{}'", path);
        let mut local_error = None;
        match std::fs::File::open(&path) {
            Ok(mut file) => {
                let mut chunk = vec![0u8; self.max_allowed_packet.min(consts::MAX_PAYLOAD_LEN)];
                loop {
                    match file.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(count) => self.write_packet(&chunk[..count])?,
                        Err(e) => {
                            local_error = Some(e);
                            break;
                        }
                    }
                }
            }
            Err(e) => local_error = Some(e),
        }
        // The empty packet ends the upload even when the file failed, the
        // exchange has to finish or the session goes out of sync.
        self.write_packet(&[])?;
        let pld = self.read_packet()?;
        if packet::is_err_packet(&pld) {
            return Err(self.server_error(&pld));
        }
        let ok = if packet::is_ok_packet(&pld) {
            let ok = OkPacket::from_payload(&pld, self.profile().era)?;
            self.handle_ok(&ok);
            Some(ok)
        } else {
            None
        };
        match local_error {
            Some(e) => Err(e.into()),
            None => Ok(ok),
        }
    }

    fn handle_result_set(&mut self) -> MyResult<(Vec<Column>, Option<OkPacket>)> {
        let profile = self.profile();
        let pld = self.read_packet()?;
        if packet::is_ok_packet(&pld) {
            let ok = OkPacket::from_payload(&pld, profile.era)?;
            self.handle_ok(&ok);
            return Ok((Vec::new(), Some(ok)));
        }
        if packet::is_err_packet(&pld) {
            return Err(self.server_error(&pld));
        }
        if packet::is_local_infile_packet(&pld) {
            let file_name = pld[1..].to_vec();
            let ok = self.send_local_infile(&file_name)?;
            return Ok((Vec::new(), ok));
        }
        let mut reader = &pld[..];
        let column_count = reader.read_lenenc_int()?;
        let mut columns: Vec<Column> = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let pld = self.read_packet()?;
            columns.push(Column::from_payload(&pld, &profile)?);
        }
        // EOF terminates the descriptor block.
        self.read_packet()?;
        self.has_results = true;
        Ok((columns, None))
    }

    fn _query(&mut self, query: &str) -> MyResult<(Vec<Column>, Option<OkPacket>)> {
        debug!("executing query `{}'", query);
        self.write_command_data(Command::COM_QUERY, query.as_bytes())?;
        self.handle_result_set()
    }

    /// Text protocol query. The returned [`QueryResult`] borrows the
    /// connection until it is dropped.
    pub fn query<T: AsRef<str>>(&mut self, query: T) -> MyResult<QueryResult<'_>> {
        let (columns, ok_packet) = self._query(query.as_ref())?;
        Ok(QueryResult::new(self, columns, ok_packet, false))
    }

    /// Shortcut for a query yielding the first row, if any.
    pub fn first<T: AsRef<str>>(&mut self, query: T) -> MyResult<Option<Vec<Value>>> {
        let mut result = self.query(query)?;
        match result.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn _prepare(&mut self, query: &str, named_params: Option<Vec<String>>) -> MyResult<InnerStmt> {
        self.write_command_data(Command::COM_STMT_PREPARE, query.as_bytes())?;
        let pld = self.read_packet()?;
        if packet::is_err_packet(&pld) {
            return Err(self.server_error(&pld));
        }
        let profile = self.profile();
        let mut stmt = InnerStmt::from_payload(&pld, named_params)?;
        if stmt.num_params > 0 {
            let mut params: Vec<Column> = Vec::with_capacity(stmt.num_params as usize);
            for _ in 0..stmt.num_params {
                let pld = self.read_packet()?;
                params.push(Column::from_payload(&pld, &profile)?);
            }
            stmt.params = Some(params);
            self.read_packet()?;
        }
        if stmt.num_columns > 0 {
            // The column block is discarded, execution responses carry
            // fresh descriptors anyway.
            for _ in 0..stmt.num_columns {
                self.drop_packet()?;
            }
            self.read_packet()?;
        }
        Ok(stmt)
    }

    /// Binary protocol prepare. Named placeholders (`:name`) are rewritten
    /// to `?` and their order is remembered for execution.
    pub fn prepare<T: AsRef<str>>(&mut self, query: T) -> MyResult<Stmt<'_>> {
        let (named_params, real_query) = parse_named_params(query.as_ref())?;
        let stmt = self._prepare(&real_query, named_params)?;
        Ok(Stmt::new(stmt, self))
    }

    /// Prepares and immediately executes a statement.
    pub fn prep_exec<A, T>(&mut self, query: A, params: T) -> MyResult<QueryResult<'_>>
    where
        A: AsRef<str>,
        T: Into<Params>,
    {
        let (named_params, real_query) = parse_named_params(query.as_ref())?;
        let stmt = self._prepare(&real_query, named_params)?;
        self.execute(&stmt, params.into())
    }

    fn send_long_data(
        &mut self,
        stmt: &InnerStmt,
        params: &[Value],
        ids: Vec<u16>,
    ) -> MyResult<()> {
        for &id in ids.iter() {
            if let Value::Bytes(ref x) = params[id as usize] {
                for chunk in x.chunks(self.max_allowed_packet - 7) {
                    let mut writer = Vec::with_capacity(chunk.len() + 6);
                    writer.write_u32::<LE>(stmt.statement_id)?;
                    writer.write_u16::<LE>(id)?;
                    writer.extend_from_slice(chunk);
                    self.write_command_data(Command::COM_STMT_SEND_LONG_DATA, &writer)?;
                }
            }
        }
        Ok(())
    }

    fn execute(&mut self, stmt: &InnerStmt, params: Params) -> MyResult<QueryResult<'_>> {
        let values = match params {
            Params::Empty => Vec::new(),
            Params::Positional(values) => values,
            named @ Params::Named(_) => {
                let names = match stmt.named_params {
                    Some(ref names) => names,
                    None => return Err(DriverError(NamedParamsForPositionalQuery)),
                };
                match named.into_positional(names)? {
                    Params::Positional(values) => values,
                    _ => Vec::new(),
                }
            }
        };
        if stmt.num_params != values.len() as u16 {
            return Err(DriverError(MismatchedStmtParams(
                stmt.num_params,
                values.len(),
            )));
        }
        let (payload, large_ids) =
            build_execute_payload(stmt, &values, self.max_allowed_packet)?;
        if let Some(ids) = large_ids {
            self.send_long_data(stmt, &values, ids)?;
        }
        self.write_command_data(Command::COM_STMT_EXECUTE, &payload)?;
        let (columns, ok_packet) = self.handle_result_set()?;
        Ok(QueryResult::new(self, columns, ok_packet, true))
    }

    /// Parameter metadata of a stored procedure, cached FIFO per
    /// connection. `name` is `schema.procedure`, the session database fills
    /// in a missing schema.
    pub fn procedure_metadata(&mut self, name: &str) -> MyResult<ProcMetadata> {
        if let Some(metadata) = self.proc_cache.get(name) {
            return Ok(metadata.clone());
        }
        let (schema, proc_name) = match name.split_once('.') {
            Some((schema, proc_name)) => (schema.to_string(), proc_name.to_string()),
            None => (
                self.opts.get_db_name().unwrap_or("").to_string(),
                name.to_string(),
            ),
        };
        let query = format!(
            "SELECT PARAMETER_NAME, PARAMETER_MODE, DTD_IDENTIFIER \
             FROM information_schema.parameters \
             WHERE SPECIFIC_SCHEMA = {} AND SPECIFIC_NAME = {} \
             ORDER BY ORDINAL_POSITION",
            Value::from(schema.as_str()).into_str(),
            Value::from(proc_name.as_str()).into_str(),
        );
        let mut params = Vec::new();
        {
            let result = self.query(&query)?;
            for row in result {
                params.push(row?);
            }
        }
        let metadata = ProcMetadata {
            name: name.to_string(),
            params,
        };
        self.proc_cache.put(name, metadata.clone());
        Ok(metadata)
    }

    fn get_system_var(&mut self, name: &str) -> Option<Value> {
        let query = format!("SELECT @@{}", name);
        match self.first(&query) {
            Ok(Some(mut row)) if !row.is_empty() => Some(row.remove(0)),
            _ => None,
        }
    }

    fn next_bin(&mut self, columns: &[Column]) -> MyResult<Option<Vec<Value>>> {
        if !self.has_results {
            return Ok(None);
        }
        let pld = match self.read_packet() {
            Ok(pld) => pld,
            Err(e) => {
                self.has_results = false;
                return Err(e);
            }
        };
        if packet::is_eof_packet(&pld) {
            self.has_results = false;
            let eof = EofPacket::from_payload(&pld, self.profile().era)?;
            self.handle_eof(&eof);
            return Ok(None);
        }
        match Value::from_bin_payload(&pld, columns) {
            Ok(row) => Ok(Some(row)),
            Err(e) => {
                self.has_results = false;
                Err(e.into())
            }
        }
    }

    fn next_text(&mut self, columns: &[Column]) -> MyResult<Option<Vec<Value>>> {
        if !self.has_results {
            return Ok(None);
        }
        let pld = match self.read_packet() {
            Ok(pld) => pld,
            Err(e) => {
                self.has_results = false;
                return Err(e);
            }
        };
        if pld.is_empty() {
            self.has_results = false;
            return Err(DriverError(UnexpectedPacket));
        }
        if (pld[0] == 0xfe || pld[0] == 0xff) && pld.len() < 0xfe {
            self.has_results = false;
            if pld[0] == 0xfe {
                let eof = EofPacket::from_payload(&pld, self.profile().era)?;
                self.handle_eof(&eof);
                return Ok(None);
            }
            return Err(self.server_error(&pld));
        }
        match Value::from_payload(&pld, columns.len()) {
            Ok(mut row) => {
                if self.opts.get_tinyint1_as_bool() {
                    coerce_tiny_bool(columns, &mut row);
                }
                Ok(Some(row))
            }
            Err(e) => {
                self.has_results = false;
                Err(e.into())
            }
        }
    }
}

/// Rewrites text protocol `TINYINT(1)` cells into integers so both
/// protocols agree on what a boolean column yields.
fn coerce_tiny_bool(columns: &[Column], row: &mut [Value]) {
    for (column, value) in columns.iter().zip(row.iter_mut()) {
        if column.column_type != ColumnType::MYSQL_TYPE_TINY || column.column_length != 1 {
            continue;
        }
        let parsed = match *value {
            Value::Bytes(ref bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok()),
            _ => None,
        };
        if let Some(x) = parsed {
            *value = Value::Int(x);
        }
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if self.connected {
            // Best effort goodbye, the connection is going away either way.
            let _ = self.write_command(Command::COM_QUIT);
        }
    }
}

#[cfg(test)]
mod test {
    use super::coerce_tiny_bool;
    use crate::consts::{ColumnFlags, ColumnType};
    use crate::packet::Column;
    use crate::value::Value;

    fn tiny_column(column_length: u32) -> Column {
        Column {
            schema: Vec::new(),
            table: Vec::new(),
            org_table: Vec::new(),
            name: b"flag".to_vec(),
            org_name: Vec::new(),
            column_length,
            character_set: 63,
            column_type: ColumnType::MYSQL_TYPE_TINY,
            flags: ColumnFlags::NUM_FLAG,
            decimals: 0,
        }
    }

    #[test]
    fn tiny1_text_cells_become_integers() {
        let columns = vec![tiny_column(1), tiny_column(4)];
        let mut row = vec![Value::Bytes(b"1".to_vec()), Value::Bytes(b"13".to_vec())];
        coerce_tiny_bool(&columns, &mut row);
        assert_eq!(row[0], Value::Int(1));
        // Wider TINYINT columns keep their text form.
        assert_eq!(row[1], Value::Bytes(b"13".to_vec()));
    }

    #[test]
    fn null_cells_are_left_alone() {
        let columns = vec![tiny_column(1)];
        let mut row = vec![Value::NULL];
        coerce_tiny_bool(&columns, &mut row);
        assert_eq!(row[0], Value::NULL);
    }

    #[cfg(unix)]
    mod session {
        use std::io::{Read as _, Write as _};
        use std::os::unix::net::UnixStream;

        use bufstream::BufStream;

        use crate::conn::{Conn, Opts, OptsBuilder};
        use crate::error::Error;
        use crate::io::Stream;

        fn err_frame(code: u16, message: &[u8]) -> Vec<u8> {
            let mut payload = vec![0xffu8];
            payload.extend_from_slice(&code.to_le_bytes());
            payload.push(b'#');
            payload.extend_from_slice(b"HY000");
            payload.extend_from_slice(message);
            let mut frame = vec![payload.len() as u8, 0, 0, 1];
            frame.extend_from_slice(&payload);
            frame
        }

        fn conn_over(sock: UnixStream) -> Conn {
            let mut conn = Conn::empty(Opts::from(OptsBuilder::new()));
            conn.stream = Some(Stream::SocketStream(BufStream::new(sock)));
            conn.connected = true;
            conn
        }

        #[test]
        fn fatal_server_error_drops_the_stream() {
            let (ours, mut peer) = UnixStream::pair().unwrap();
            // ER_SERVER_SHUTDOWN
            peer.write_all(&err_frame(1053, b"Server shutdown in progress"))
                .unwrap();
            let mut conn = conn_over(ours);
            match conn.query("DO 1") {
                Err(Error::MySqlError(e)) => assert_eq!(e.code, 1053),
                other => panic!("unexpected result {:?}", other.map(|_| ())),
            }
            assert!(conn.stream.is_none());
            assert!(!conn.connected);
        }

        #[test]
        fn recoverable_server_error_keeps_the_stream() {
            let (ours, mut peer) = UnixStream::pair().unwrap();
            // ER_PARSE_ERROR
            peer.write_all(&err_frame(1064, b"You have an error in your SQL syntax"))
                .unwrap();
            let mut conn = conn_over(ours);
            match conn.query("DO 1") {
                Err(Error::MySqlError(e)) => assert_eq!(e.code, 1064),
                other => panic!("unexpected result {:?}", other.map(|_| ())),
            }
            assert!(conn.stream.is_some());
        }

        #[test]
        fn unreadable_local_file_still_finishes_the_upload() {
            let (ours, mut peer) = UnixStream::pair().unwrap();
            // OK reply the server sends once the upload is terminated.
            peer.write_all(&[7, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]).unwrap();
            let mut conn = conn_over(ours);
            let err = conn
                .send_local_infile(b"/no/such/file/anywhere")
                .unwrap_err();
            assert!(matches!(err, Error::IoError(_)));
            // The terminating empty packet went out before the error surfaced,
            // leaving the session in sync and usable.
            let mut header = [0u8; 4];
            peer.read_exact(&mut header).unwrap();
            assert_eq!(header, [0, 0, 0, 0]);
            assert!(conn.stream.is_some());
        }
    }
}

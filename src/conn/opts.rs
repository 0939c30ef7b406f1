// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
#[cfg(feature = "native-tls")]
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Ssl options.
#[cfg(feature = "native-tls")]
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct SslOpts {
    pkcs12_path: Option<PathBuf>,
    password: Option<String>,
    root_cert_path: Option<PathBuf>,
    skip_domain_validation: bool,
    accept_invalid_certs: bool,
}

#[cfg(feature = "native-tls")]
impl SslOpts {
    /// Sets the path to a pkcs12 archive with the client identity.
    pub fn set_pkcs12_path<T: Into<PathBuf>>(&mut self, pkcs12_path: Option<T>) -> &mut Self {
        self.pkcs12_path = pkcs12_path.map(Into::into);
        self
    }

    /// Sets the password for the pkcs12 archive (defaults to `None`).
    pub fn set_password<T: Into<String>>(&mut self, password: Option<T>) -> &mut Self {
        self.password = password.map(Into::into);
        self
    }

    /// Sets the path to a PEM certificate of the root that signed the
    /// server's certificate.
    pub fn set_root_cert_path<T: Into<PathBuf>>(&mut self, root_cert_path: Option<T>) -> &mut Self {
        self.root_cert_path = root_cert_path.map(Into::into);
        self
    }

    /// The driver will not validate the server's domain name (defaults to
    /// `false`).
    pub fn set_danger_skip_domain_validation(&mut self, value: bool) -> &mut Self {
        self.skip_domain_validation = value;
        self
    }

    /// The driver will not validate the server's certificate (defaults to
    /// `false`).
    pub fn set_danger_accept_invalid_certs(&mut self, value: bool) -> &mut Self {
        self.accept_invalid_certs = value;
        self
    }

    pub fn pkcs12_path(&self) -> Option<&Path> {
        self.pkcs12_path.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn root_cert_path(&self) -> Option<&Path> {
        self.root_cert_path.as_deref()
    }

    pub fn skip_domain_validation(&self) -> bool {
        self.skip_domain_validation
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
}

/// Mysql connection options.
///
/// Build one with [`OptsBuilder`]:
///
/// ```ignore
/// let mut builder = OptsBuilder::new();
/// builder.user(Some("root"))
///        .pass(Some("password"))
///        .db_name(Some("mydb"));
/// let opts: Opts = builder.into();
/// ```
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Opts {
    /// Address of mysql server (defaults to `127.0.0.1`). Hostnames should
    /// also work.
    ip_or_hostname: String,
    /// TCP port of mysql server (defaults to `3306`).
    tcp_port: u16,
    /// Path to a unix socket, or a windows pipe name (defaults to `None`).
    socket: Option<String>,
    /// User (defaults to `None`).
    user: Option<String>,
    /// Password (defaults to `None`).
    pass: Option<String>,
    /// Database name (defaults to `None`).
    db_name: Option<String>,

    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    tcp_keepalive_time: Option<u32>,
    tcp_nodelay: bool,
    tcp_connect_timeout: Option<Duration>,
    bind_address: Option<SocketAddr>,

    /// Prefer a socket connection (defaults to `true`).
    ///
    /// The driver will reconnect via socket (or named pipe on windows) after
    /// a TCP connection to `127.0.0.1` if the server supports it.
    prefer_socket: bool,
    /// Commands to execute on each new database connection.
    init: Vec<String>,
    /// Request the compressed protocol (defaults to `false`).
    compress: bool,
    /// Ask the server to apply `interactive_timeout` instead of
    /// `wait_timeout` to this session (defaults to `false`).
    interactive: bool,
    /// Refuse the insecure pre-4.1 scramble when a newer server downgrades
    /// to it (defaults to `false`, the downgrade is followed transparently).
    secure_auth: bool,
    /// Decode `TINYINT(1)` columns as `0`/`1` integers even when the server
    /// sends them as text (defaults to `false`).
    tinyint1_as_bool: bool,
    /// Capacity of the per-connection stored procedure metadata cache
    /// (defaults to `25`).
    proc_cache_size: usize,

    /// Lower bound of a connection pool built from these options
    /// (defaults to `10`).
    pool_min: usize,
    /// Upper bound of a connection pool built from these options
    /// (defaults to `100`).
    pool_max: usize,
    /// Pooled connections older than this are discarded on acquire
    /// (defaults to `None`).
    conn_ttl: Option<Duration>,

    #[cfg(feature = "native-tls")]
    ssl_opts: Option<SslOpts>,
}

impl Opts {
    pub fn get_ip_or_hostname(&self) -> &str {
        &self.ip_or_hostname
    }

    pub fn get_tcp_port(&self) -> u16 {
        self.tcp_port
    }

    pub fn get_socket(&self) -> Option<&str> {
        self.socket.as_deref()
    }

    pub fn get_user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn get_pass(&self) -> Option<&str> {
        self.pass.as_deref()
    }

    pub fn get_db_name(&self) -> Option<&str> {
        self.db_name.as_deref()
    }

    pub fn get_read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn get_write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    /// TCP keepalive time, milliseconds.
    pub fn get_tcp_keepalive_time_ms(&self) -> Option<u32> {
        self.tcp_keepalive_time
    }

    pub fn get_tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }

    pub fn get_tcp_connect_timeout(&self) -> Option<Duration> {
        self.tcp_connect_timeout
    }

    pub fn get_bind_address(&self) -> Option<&SocketAddr> {
        self.bind_address.as_ref()
    }

    pub fn get_prefer_socket(&self) -> bool {
        self.prefer_socket
    }

    pub fn get_init(&self) -> &[String] {
        &self.init
    }

    pub fn get_compress(&self) -> bool {
        self.compress
    }

    pub fn get_interactive(&self) -> bool {
        self.interactive
    }

    pub fn get_secure_auth(&self) -> bool {
        self.secure_auth
    }

    pub fn get_tinyint1_as_bool(&self) -> bool {
        self.tinyint1_as_bool
    }

    pub fn get_proc_cache_size(&self) -> usize {
        self.proc_cache_size
    }

    pub fn get_pool_min(&self) -> usize {
        self.pool_min
    }

    pub fn get_pool_max(&self) -> usize {
        self.pool_max
    }

    pub fn get_conn_ttl(&self) -> Option<Duration> {
        self.conn_ttl
    }

    #[cfg(feature = "native-tls")]
    pub fn get_ssl_opts(&self) -> Option<&SslOpts> {
        self.ssl_opts.as_ref()
    }

    #[cfg(not(feature = "native-tls"))]
    pub(crate) fn ssl_enabled(&self) -> bool {
        false
    }

    #[cfg(feature = "native-tls")]
    pub(crate) fn ssl_enabled(&self) -> bool {
        self.ssl_opts.is_some()
    }

    /// The pooling key. Two `Opts` share a pool only if every setting,
    /// secrets included, is identical.
    pub fn pool_key(&self) -> String {
        format!("{:?}", self)
    }

    pub(crate) fn addr_is_loopback(&self) -> bool {
        let v4: Option<Ipv4Addr> = FromStr::from_str(&self.ip_or_hostname).ok();
        let v6: Option<Ipv6Addr> = FromStr::from_str(&self.ip_or_hostname).ok();
        if let Some(addr) = v4 {
            addr.octets()[0] == 127
        } else if let Some(addr) = v6 {
            addr.segments() == [0, 0, 0, 0, 0, 0, 0, 1]
        } else {
            self.ip_or_hostname == "localhost"
        }
    }
}

impl Default for Opts {
    fn default() -> Opts {
        Opts {
            ip_or_hostname: "127.0.0.1".to_string(),
            tcp_port: 3306,
            socket: None,
            user: None,
            pass: None,
            db_name: None,
            read_timeout: None,
            write_timeout: None,
            tcp_keepalive_time: None,
            tcp_nodelay: true,
            tcp_connect_timeout: None,
            bind_address: None,
            prefer_socket: true,
            init: vec![],
            compress: false,
            interactive: false,
            secure_auth: false,
            tinyint1_as_bool: false,
            proc_cache_size: 25,
            pool_min: 10,
            pool_max: 100,
            conn_ttl: None,
            #[cfg(feature = "native-tls")]
            ssl_opts: None,
        }
    }
}

/// Provides a way to adjust [`Opts`].
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct OptsBuilder {
    opts: Opts,
}

impl OptsBuilder {
    pub fn new() -> Self {
        OptsBuilder::default()
    }

    pub fn from_opts(opts: Opts) -> Self {
        OptsBuilder { opts }
    }

    /// Address of mysql server (defaults to `127.0.0.1`).
    pub fn ip_or_hostname<T: Into<String>>(&mut self, ip_or_hostname: Option<T>) -> &mut Self {
        self.opts.ip_or_hostname = ip_or_hostname
            .map(Into::into)
            .unwrap_or_else(|| "127.0.0.1".to_string());
        self
    }

    /// TCP port of mysql server (defaults to `3306`).
    pub fn tcp_port(&mut self, tcp_port: u16) -> &mut Self {
        self.opts.tcp_port = tcp_port;
        self
    }

    /// Path to a unix socket, or a windows pipe name (defaults to `None`).
    pub fn socket<T: Into<String>>(&mut self, socket: Option<T>) -> &mut Self {
        self.opts.socket = socket.map(Into::into);
        self
    }

    /// User (defaults to `None`).
    pub fn user<T: Into<String>>(&mut self, user: Option<T>) -> &mut Self {
        self.opts.user = user.map(Into::into);
        self
    }

    /// Password (defaults to `None`).
    pub fn pass<T: Into<String>>(&mut self, pass: Option<T>) -> &mut Self {
        self.opts.pass = pass.map(Into::into);
        self
    }

    /// Database name (defaults to `None`).
    pub fn db_name<T: Into<String>>(&mut self, db_name: Option<T>) -> &mut Self {
        self.opts.db_name = db_name.map(Into::into);
        self
    }

    /// Read timeout on the underlying stream (defaults to `None`).
    pub fn read_timeout(&mut self, read_timeout: Option<Duration>) -> &mut Self {
        self.opts.read_timeout = read_timeout;
        self
    }

    /// Write timeout on the underlying stream (defaults to `None`).
    pub fn write_timeout(&mut self, write_timeout: Option<Duration>) -> &mut Self {
        self.opts.write_timeout = write_timeout;
        self
    }

    /// TCP keepalive time, milliseconds (defaults to `None`).
    pub fn tcp_keepalive_time_ms(&mut self, tcp_keepalive_time_ms: Option<u32>) -> &mut Self {
        self.opts.tcp_keepalive_time = tcp_keepalive_time_ms;
        self
    }

    /// Whether to set TCP_NODELAY on the connection (defaults to `true`).
    pub fn tcp_nodelay(&mut self, nodelay: bool) -> &mut Self {
        self.opts.tcp_nodelay = nodelay;
        self
    }

    /// Connect timeout for TCP connections (defaults to `None`).
    pub fn tcp_connect_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.opts.tcp_connect_timeout = timeout;
        self
    }

    /// Local address to bind the TCP socket to (defaults to `None`).
    pub fn bind_address<T: Into<SocketAddr>>(&mut self, bind_address: Option<T>) -> &mut Self {
        self.opts.bind_address = bind_address.map(Into::into);
        self
    }

    /// Prefer a socket connection (defaults to `true`).
    pub fn prefer_socket(&mut self, prefer_socket: bool) -> &mut Self {
        self.opts.prefer_socket = prefer_socket;
        self
    }

    /// Commands to execute on each new database connection.
    pub fn init<T: Into<String>>(&mut self, init: Vec<T>) -> &mut Self {
        self.opts.init = init.into_iter().map(Into::into).collect();
        self
    }

    /// Request the compressed protocol (defaults to `false`).
    pub fn compress(&mut self, compress: bool) -> &mut Self {
        self.opts.compress = compress;
        self
    }

    /// Ask the server to apply `interactive_timeout` instead of
    /// `wait_timeout` to this session (defaults to `false`).
    pub fn interactive(&mut self, interactive: bool) -> &mut Self {
        self.opts.interactive = interactive;
        self
    }

    /// Refuse the insecure pre-4.1 scramble when a newer server downgrades
    /// to it (defaults to `false`, the downgrade is followed transparently).
    pub fn secure_auth(&mut self, secure_auth: bool) -> &mut Self {
        self.opts.secure_auth = secure_auth;
        self
    }

    /// Decode `TINYINT(1)` text values as integers (defaults to `false`).
    pub fn tinyint1_as_bool(&mut self, value: bool) -> &mut Self {
        self.opts.tinyint1_as_bool = value;
        self
    }

    /// Capacity of the stored procedure metadata cache (defaults to `25`).
    pub fn proc_cache_size(&mut self, cap: usize) -> &mut Self {
        self.opts.proc_cache_size = cap;
        self
    }

    /// Pool bounds for pools built from these options (defaults to
    /// `10..=100`).
    pub fn pool_constraints(&mut self, min: usize, max: usize) -> &mut Self {
        self.opts.pool_min = min;
        self.opts.pool_max = max;
        self
    }

    /// Pooled connections older than this are discarded on acquire
    /// (defaults to `None`).
    pub fn conn_ttl(&mut self, ttl: Option<Duration>) -> &mut Self {
        self.opts.conn_ttl = ttl;
        self
    }

    #[cfg(feature = "native-tls")]
    pub fn ssl_opts(&mut self, ssl_opts: Option<SslOpts>) -> &mut Self {
        self.opts.ssl_opts = ssl_opts;
        self
    }
}

impl From<OptsBuilder> for Opts {
    fn from(builder: OptsBuilder) -> Opts {
        builder.opts
    }
}

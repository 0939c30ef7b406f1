// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! ### myconn
//! Mysql client library implemented in rust.
//!
//! Speaks the text and binary protocols against servers from 3.23 up,
//! with optional zlib compression and TLS (behind the `native-tls`
//! feature).
//!
//! #### Example
//!
//! ```no_run
//! use myconn::{Conn, Opts, OptsBuilder, Pool, Value};
//!
//! fn main() -> myconn::Result<()> {
//!     let mut builder = OptsBuilder::new();
//!     builder
//!         .user(Some("root"))
//!         .pass(Some("password"))
//!         .db_name(Some("mysql"));
//!     let opts = Opts::from(builder);
//!
//!     // One off connection.
//!     let mut conn = Conn::new(opts.clone())?;
//!     // Named placeholders are rewritten to positional ones at prepare
//!     // time, positional values still work against them.
//!     let mut stmt = conn.prepare("SELECT :id, :name")?;
//!     for row in stmt.execute((Value::Int(1), Value::from("bar")))? {
//!         println!("{:?}", row?);
//!     }
//!
//!     // Or a pool shared between threads.
//!     let pool = Pool::new(opts)?;
//!     let mut conn = pool.get_conn()?;
//!     conn.query("SELECT 1")?;
//!     Ok(())
//! }
//! ```

mod conn;
pub mod consts;
pub mod error;
mod io;
mod named_params;
mod packet;
mod scramble;
mod value;

#[cfg(feature = "native-tls")]
#[doc(inline)]
pub use crate::conn::opts::SslOpts;
#[doc(inline)]
pub use crate::conn::opts::{Opts, OptsBuilder};
#[doc(inline)]
pub use crate::conn::pool::{Pool, PoolManager, PooledConn};
#[doc(inline)]
pub use crate::conn::proc_cache::ProcMetadata;
#[doc(inline)]
pub use crate::conn::query_result::QueryResult;
#[doc(inline)]
pub use crate::conn::stmt::Stmt;
#[doc(inline)]
pub use crate::conn::Conn;
#[doc(inline)]
pub use crate::error::{DriverError, Error, MySqlError, Result};
#[doc(inline)]
pub use crate::packet::Column;
#[doc(inline)]
pub use crate::value::{Params, Value};

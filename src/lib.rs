//! Shared-state broadcast server.
//!
//! A TCP service that maps string keys to SHA-1 content hashes and keeps
//! that mapping consistent across every connected client. Clients submit
//! `KEY VALUE` lines; the server hashes the value, stores the mapping when
//! the hash actually changed, and pushes the change to every live session,
//! including the submitter. A newly connected client is first streamed the
//! full current state, then receives live updates.
//!
//! Each module owns one concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`hasher`] computes SHA-1 digests on the blocking pool and delivers
//!   results in submission order.
//! - [`store`] owns the `key -> hash` map, detects real changes, and serves
//!   the snapshot cursor used to sync new clients.
//! - [`registry`] tracks live sessions and fans broadcast lines out to them.
//! - [`session`] services one connection: line parsing, serial writes, and
//!   the connect-time sync stream.
//! - [`server`] accepts connections and wires sessions to the store and
//!   registry.
//! - [`client`] connects to a server, forwards stdin lines as updates, and
//!   prints received lines for a terminal user.
//!
//! Integration tests drive the server future directly over loopback
//! sockets; the end-to-end test spawns the compiled binary in both roles.

pub mod cli;
pub mod client;
pub mod hasher;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;

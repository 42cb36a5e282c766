//! # voltage_iec104
//!
//! IEC 60870-5-104 protocol implementation for Rust.
//!
//! This crate provides a complete implementation of the IEC 60870-5-104
//! telecontrol protocol, commonly used in power systems and SCADA applications.
//!
//! ## Features
//!
//! - **Event-driven**: Asynchronous data reception via channels
//! - **Full Protocol Support**: I-frames, S-frames, U-frames
//! - **Standard Timeouts**: T1, T2, T3, K, W parameters
//! - **Type Safe**: Strong typing for TypeID, COT, IOA
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voltage_iec104::{ClientConfig, ClientEngine, RemoteConfig};
//!
//! #[tokio::main]
//! async fn main() -> voltage_iec104::Result<()> {
//!     let engine = ClientEngine::new(ClientConfig::default())?;
//!     let mut events = engine.subscribe().await.unwrap();
//!
//!     engine.add_remote("rtu-1", RemoteConfig::new("192.168.1.100:2404".parse().unwrap()))?;
//!     engine.connect("rtu-1").await?;
//!
//!     // Request general interrogation
//!     engine.general_interrogation("rtu-1", 1).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol Overview
//!
//! IEC 60870-5-104 uses TCP/IP for communication (default port 2404).
//! The protocol defines three frame types:
//!
//! - **I-frame**: Information transfer (contains ASDU)
//! - **S-frame**: Supervisory (acknowledgment)
//! - **U-frame**: Unnumbered (control: STARTDT, STOPDT, TESTFR)
//!
//! ### APDU Structure
//!
//! ```text
//! APCI (6 bytes):
//! +--------+--------+--------+--------+--------+--------+
//! | 0x68   | Length | Control Field (4 bytes)           |
//! +--------+--------+--------+--------+--------+--------+
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod callback;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod decode;
pub mod encode;
pub mod error;
pub mod information;
pub mod parser;
pub mod point;
pub mod scheduler;
pub mod server;
pub mod station;
pub mod types;
pub mod window;

// Re-export main types
pub use callback::{Callback, ResponseState};
pub use client::{ClientConfig, ClientEngine, ClientEvent, RemoteConfig};
pub use codec::{Apdu, Iec104Codec};
pub use config::{ApciParameters, CommandMode, DebugFlags, Init};
pub use connection::{Connection, ConnState, Effect, InitAction};
pub use correlator::{CommandKey, Correlator, Expected, Outcome, PendingCommand};
pub use decode::decode_command_object;
pub use encode::{encode_command_object, encode_information_object};
pub use error::{Iec104Error, Result};
pub use information::{CommandInfo, Information, QualifierOfCommand};
pub use parser::parse_asdu;
pub use point::{DataPoint, IncomingMessage, PointBuilder, Selection};
pub use scheduler::{Scheduler, TaskId};
pub use server::{ServerConfig, ServerEngine, ServerEvent};
pub use station::{CauseOfInitialization, Role, Station};
pub use types::*;
pub use window::{RecvWindow, SendWindow};

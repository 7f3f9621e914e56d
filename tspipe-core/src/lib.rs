//! # tspipe Core
//!
//! Core types for the tspipe transport stream toolkit.
//!
//! This crate provides the fundamental building blocks used across all tspipe
//! components:
//! - Error handling types
//! - 188-byte MPEG-TS packet abstraction
//! - Modified Julian Date (MJD) time codec

pub mod error;
pub mod mjd;
pub mod packet;

pub use error::{Error, Result};
pub use mjd::{decode_mjd, encode_mjd, MJD_MIN_SIZE, MJD_SIZE};
pub use packet::{
    TsPacket, PID_CAT, PID_EIT, PID_MAX, PID_NULL, PID_PAT, PID_SDT, PID_TSDT, SYNC_BYTE,
    TS_PACKET_SIZE,
};

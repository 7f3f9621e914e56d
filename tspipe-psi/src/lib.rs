//! # tspipe PSI
//!
//! Program Specific Information codecs for the tspipe transport stream
//! toolkit: PSI/SI sections with CRC-32/MPEG-2 protection, binary tables,
//! descriptor lists and the Program Map Table (PMT).
//!
//! All DVB tables follow the same binary section model implemented here; the
//! PMT is the fully-worked table codec, including the semantic stream
//! classification predicates used for service filtering.

pub mod crc;
pub mod descriptor;
pub mod error;
pub mod pmt;
pub mod section;
pub mod stream_type;

pub use crc::calculate_crc32;
pub use descriptor::{
    Descriptor, DescriptorList, DID_AAC, DID_AC3, DID_DTS, DID_ENHANCED_AC3, DID_SUBTITLING,
    DID_TELETEXT,
};
pub use error::{PsiError, Result};
pub use pmt::{Pmt, PmtStream};
pub use section::{
    BinaryTable, Section, LONG_SECTION_HEADER_SIZE, MAX_PSI_LONG_SECTION_PAYLOAD_SIZE,
    MAX_PSI_SECTION_SIZE, SECTION_CRC_SIZE,
};
pub use stream_type::{is_audio_stream_type, is_video_stream_type, StreamType};

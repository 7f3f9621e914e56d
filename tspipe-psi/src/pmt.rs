//! Program Map Table (PMT) codec.
//!
//! The PMT describes one program: its PCR PID, program-level descriptors and
//! the elementary streams keyed by PID. A PMT is constrained to a single
//! section (ISO/IEC 13818-1 2.4.4.8).
//!
//! Malformed input never raises an error here; deserialization yields a value
//! flagged invalid, and a serialization that cannot fit the single-section
//! limit leaves the output table cleared.

use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder};

use crate::descriptor::{
    DescriptorList, DID_AAC, DID_AC3, DID_DTS, DID_ENHANCED_AC3, DID_SUBTITLING, DID_TELETEXT,
};
use crate::section::{BinaryTable, Section, MAX_PSI_LONG_SECTION_PAYLOAD_SIZE};
use crate::stream_type::{is_audio_stream_type, is_video_stream_type};
use tspipe_core::PID_NULL;

/// One elementary stream described by a PMT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PmtStream {
    /// Raw stream_type value.
    pub stream_type: u8,
    /// ES-level descriptor list.
    pub descriptors: DescriptorList,
}

impl PmtStream {
    /// Check if this stream carries video, from the stream type alone.
    pub fn is_video(&self) -> bool {
        is_video_stream_type(self.stream_type)
    }

    /// Check if this stream carries audio.
    ///
    /// AC-3, E-AC-3, DTS and HE-AAC components commonly use the "PES private
    /// data" stream type and are identified by their descriptors instead.
    pub fn is_audio(&self) -> bool {
        is_audio_stream_type(self.stream_type)
            || self.descriptors.contains(DID_DTS)
            || self.descriptors.contains(DID_AC3)
            || self.descriptors.contains(DID_ENHANCED_AC3)
            || self.descriptors.contains(DID_AAC)
    }

    /// Check if this stream carries subtitles.
    ///
    /// A subtitling descriptor always indicates subtitles; a teletext
    /// descriptor indicates subtitles when any of its language entries has a
    /// subtitle teletext type (2 or 5).
    pub fn is_subtitles(&self) -> bool {
        if self.descriptors.contains(DID_SUBTITLING) {
            return true;
        }
        self.descriptors
            .iter()
            .filter(|d| d.tag == DID_TELETEXT)
            .any(|d| {
                // 5-byte language entries; the teletext type is in bits 7..3
                // of the fourth byte.
                d.payload
                    .chunks_exact(5)
                    .map(|entry| entry[3] >> 3)
                    .any(|teletext_type| teletext_type == 0x02 || teletext_type == 0x05)
            })
    }
}

/// A Program Map Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    /// 5-bit table version.
    pub version: u8,
    /// Current/next indicator.
    pub is_current: bool,
    /// Service (program) number, carried as the table id extension.
    pub service_id: u16,
    /// PID carrying the program clock reference.
    pub pcr_pid: u16,
    /// Program-level descriptor list.
    pub descriptors: DescriptorList,
    /// Elementary streams keyed by PID. Iteration (and therefore
    /// serialization) is in ascending PID order.
    pub streams: BTreeMap<u16, PmtStream>,
    is_valid: bool,
}

impl Pmt {
    /// PMT table id.
    pub const TABLE_ID: u8 = 0x02;

    /// Create a new, valid, empty PMT.
    pub fn new(version: u8, is_current: bool, service_id: u16, pcr_pid: u16) -> Self {
        Self {
            version,
            is_current,
            service_id,
            pcr_pid,
            descriptors: DescriptorList::new(),
            streams: BTreeMap::new(),
            is_valid: true,
        }
    }

    /// Build a PMT from a binary table.
    pub fn from_table(table: &BinaryTable) -> Self {
        let mut pmt = Self::new(0, true, 0, PID_NULL);
        pmt.deserialize(table);
        pmt
    }

    /// Whether the last deserialization (or construction) produced a
    /// consistent table.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Add an elementary stream, returning a handle to fill its descriptors.
    pub fn add_stream(&mut self, pid: u16, stream_type: u8) -> &mut PmtStream {
        let stream = self.streams.entry(pid).or_default();
        stream.stream_type = stream_type;
        stream
    }

    /// Deserialize from a binary table.
    ///
    /// The content is cleared first; on any inconsistency (wrong table id,
    /// missing PCR/length fields) the PMT is left invalid. Declared lengths
    /// are clamped to the remaining payload, and a PID appearing twice keeps
    /// its last occurrence.
    pub fn deserialize(&mut self, table: &BinaryTable) {
        self.is_valid = false;
        self.service_id = 0;
        self.pcr_pid = PID_NULL;
        self.descriptors = DescriptorList::new();
        self.streams.clear();

        if !table.is_valid() || table.table_id() != Some(Self::TABLE_ID) {
            return;
        }

        // A PMT is not allowed more than one section, but tolerate extra
        // sections the way the section filter may deliver them.
        for section in table.sections() {
            self.version = section.version();
            self.is_current = section.is_current();
            self.service_id = section.table_id_extension();

            let mut data = section.payload();

            if data.len() < 2 {
                return;
            }
            self.pcr_pid = BigEndian::read_u16(data) & 0x1FFF;
            data = &data[2..];

            if data.len() < 2 {
                return;
            }
            let mut info_length = (BigEndian::read_u16(data) & 0x0FFF) as usize;
            data = &data[2..];
            info_length = info_length.min(data.len());
            self.descriptors.add(&data[..info_length]);
            data = &data[info_length..];

            while data.len() >= 5 {
                let stream_type = data[0];
                let pid = BigEndian::read_u16(&data[1..3]) & 0x1FFF;
                let mut es_length = (BigEndian::read_u16(&data[3..5]) & 0x0FFF) as usize;
                data = &data[5..];
                es_length = es_length.min(data.len());

                let stream = self.streams.entry(pid).or_default();
                stream.stream_type = stream_type;
                stream.descriptors = DescriptorList::new();
                stream.descriptors.add(&data[..es_length]);
                data = &data[es_length..];
            }
        }

        self.is_valid = true;
    }

    /// Serialize into a binary table as a single long section.
    ///
    /// When the program does not fit in one section the table is left
    /// cleared (invalid); callers must detect that and restructure the
    /// program.
    pub fn serialize(&self, table: &mut BinaryTable) {
        table.clear();

        if !self.is_valid {
            return;
        }

        let mut payload = Vec::with_capacity(MAX_PSI_LONG_SECTION_PAYLOAD_SIZE);

        // PCR PID with the three reserved bits set.
        payload.extend_from_slice(&(self.pcr_pid | 0xE000).to_be_bytes());

        let mut remain = MAX_PSI_LONG_SECTION_PAYLOAD_SIZE - payload.len();
        let next = self.descriptors.length_serialize(&mut payload, remain);
        if next != self.descriptors.len() {
            return;
        }

        for (pid, stream) in &self.streams {
            remain = MAX_PSI_LONG_SECTION_PAYLOAD_SIZE - payload.len();
            if remain < 5 {
                return;
            }
            payload.push(stream.stream_type);
            payload.extend_from_slice(&(*pid | 0xE000).to_be_bytes());
            remain -= 3;

            let next = stream.descriptors.length_serialize(&mut payload, remain);
            if next != stream.descriptors.len() {
                return;
            }
        }

        let section = match Section::new_long(
            Self::TABLE_ID,
            self.service_id,
            self.version,
            self.is_current,
            0,
            0,
            payload,
        ) {
            Ok(section) => section,
            Err(_) => return,
        };
        // Consistency with the empty table is guaranteed.
        let _ = table.add_section(section);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;

    fn single_section_table(payload: Vec<u8>, service_id: u16) -> BinaryTable {
        let section = Section::new_long(Pmt::TABLE_ID, service_id, 1, true, 0, 0, payload).unwrap();
        let mut table = BinaryTable::new();
        table.add_section(section).unwrap();
        table
    }

    #[test]
    fn test_deserialize_minimal_program() {
        // PCR PID 0x0100, no program descriptors, one H.264 stream on
        // PID 0x0100 with no ES descriptors.
        let payload = vec![0xE1, 0x00, 0xF0, 0x00, 0x1B, 0xE1, 0x00, 0xF0, 0x00];
        let table = single_section_table(payload, 0x0007);

        let pmt = Pmt::from_table(&table);
        assert!(pmt.is_valid());
        assert_eq!(pmt.service_id, 0x0007);
        assert_eq!(pmt.pcr_pid, 0x0100);
        assert!(pmt.descriptors.is_empty());
        assert_eq!(pmt.streams.len(), 1);

        let stream = &pmt.streams[&0x0100];
        assert_eq!(stream.stream_type, 0x1B);
        assert!(stream.is_video());
        assert!(!stream.is_audio());
    }

    #[test]
    fn test_deserialize_wrong_table_id() {
        let section = Section::new_long(0x42, 1, 0, true, 0, 0, vec![0xE1, 0x00, 0xF0, 0x00]).unwrap();
        let mut table = BinaryTable::new();
        table.add_section(section).unwrap();
        assert!(!Pmt::from_table(&table).is_valid());
    }

    #[test]
    fn test_deserialize_short_payload() {
        let table = single_section_table(vec![0xE1], 1);
        assert!(!Pmt::from_table(&table).is_valid());

        let table = single_section_table(vec![0xE1, 0x00, 0xF0], 1);
        assert!(!Pmt::from_table(&table).is_valid());
    }

    #[test]
    fn test_deserialize_clamps_info_length() {
        // program_info_length claims 0x20 bytes but only a 2-byte descriptor
        // follows; the length is clamped to the remaining payload.
        let payload = vec![0xE1, 0x00, 0xF0, 0x20, 0x6A, 0x00];
        let table = single_section_table(payload, 1);
        let pmt = Pmt::from_table(&table);
        assert!(pmt.is_valid());
        assert_eq!(pmt.descriptors.len(), 1);
        assert!(pmt.streams.is_empty());
    }

    #[test]
    fn test_duplicate_pid_last_wins() {
        let payload = vec![
            0xE1, 0x00, 0xF0, 0x00, // PCR, no program info
            0x02, 0xE2, 0x00, 0xF0, 0x00, // MPEG-2 video on PID 0x0200
            0x1B, 0xE2, 0x00, 0xF0, 0x00, // H.264 on the same PID
        ];
        let table = single_section_table(payload, 1);
        let pmt = Pmt::from_table(&table);
        assert!(pmt.is_valid());
        assert_eq!(pmt.streams.len(), 1);
        assert_eq!(pmt.streams[&0x0200].stream_type, 0x1B);
    }

    #[test]
    fn test_roundtrip_preserves_everything() {
        let mut pmt = Pmt::new(3, true, 0x0015, 0x0100);
        pmt.descriptors
            .push(Descriptor::new(0x09, vec![0x01, 0x02, 0xE0, 0x21]).unwrap());
        pmt.add_stream(0x0100, 0x1B);
        let audio = pmt.add_stream(0x0101, 0x06);
        audio
            .descriptors
            .push(Descriptor::new(DID_AC3, vec![]).unwrap());
        audio
            .descriptors
            .push(Descriptor::new(0x0A, vec![b'f', b'r', b'a', 0x00]).unwrap());

        let mut table = BinaryTable::new();
        pmt.serialize(&mut table);
        assert!(table.is_valid());
        assert_eq!(table.section_count(), 1);
        assert_eq!(table.table_id(), Some(Pmt::TABLE_ID));
        assert_eq!(table.table_id_extension(), Some(0x0015));

        let decoded = Pmt::from_table(&table);
        assert!(decoded.is_valid());
        assert_eq!(decoded, pmt);
    }

    #[test]
    fn test_serialize_sets_reserved_bits() {
        let mut pmt = Pmt::new(0, true, 1, 0x0100);
        pmt.add_stream(0x0101, 0x1B);

        let mut table = BinaryTable::new();
        pmt.serialize(&mut table);
        let payload = table.section_at(0).unwrap().payload();
        assert_eq!(payload[0], 0xE1);
        assert_eq!(payload[1], 0x00);
        assert_eq!(payload[2] & 0xF0, 0xF0);
    }

    #[test]
    fn test_serialize_ascending_pid_order() {
        let mut pmt = Pmt::new(0, true, 1, 0x0100);
        pmt.add_stream(0x0300, 0x04);
        pmt.add_stream(0x0100, 0x1B);
        pmt.add_stream(0x0200, 0x0F);

        let mut table = BinaryTable::new();
        pmt.serialize(&mut table);
        let payload = table.section_at(0).unwrap().payload();

        let mut pids = Vec::new();
        let mut data = &payload[4..];
        while data.len() >= 5 {
            pids.push(BigEndian::read_u16(&data[1..3]) & 0x1FFF);
            let es_len = (BigEndian::read_u16(&data[3..5]) & 0x0FFF) as usize;
            data = &data[5 + es_len..];
        }
        assert_eq!(pids, vec![0x0100, 0x0200, 0x0300]);
    }

    #[test]
    fn test_serialize_overflow_leaves_table_invalid() {
        let mut pmt = Pmt::new(0, true, 1, 0x0100);
        // 6 streams of ~5 + 2 + 250 bytes each overflow the 1012-byte payload.
        for i in 0..6u16 {
            let stream = pmt.add_stream(0x0100 + i, 0x06);
            stream
                .descriptors
                .push(Descriptor::new(0x05, vec![0u8; 250]).unwrap());
        }

        let mut table = BinaryTable::new();
        pmt.serialize(&mut table);
        assert!(!table.is_valid());
    }

    #[test]
    fn test_audio_predicate_by_descriptor() {
        let mut stream = PmtStream {
            stream_type: 0x06,
            descriptors: DescriptorList::new(),
        };
        assert!(!stream.is_audio());

        stream
            .descriptors
            .push(Descriptor::new(DID_AC3, vec![]).unwrap());
        assert!(stream.is_audio());
        assert!(!stream.is_video());
    }

    #[test]
    fn test_subtitles_predicate() {
        // Subtitling descriptor: always subtitles.
        let mut stream = PmtStream {
            stream_type: 0x06,
            descriptors: DescriptorList::new(),
        };
        stream
            .descriptors
            .push(Descriptor::new(DID_SUBTITLING, vec![]).unwrap());
        assert!(stream.is_subtitles());

        // Teletext with type 3 (additional information page): no subtitles.
        let mut stream = PmtStream {
            stream_type: 0x06,
            descriptors: DescriptorList::new(),
        };
        stream
            .descriptors
            .push(Descriptor::new(DID_TELETEXT, vec![b'e', b'n', b'g', 0x18, 0x01]).unwrap());
        assert!(!stream.is_subtitles());

        // Teletext with type 2 (subtitle page): subtitles.
        let mut stream = PmtStream {
            stream_type: 0x06,
            descriptors: DescriptorList::new(),
        };
        stream
            .descriptors
            .push(Descriptor::new(DID_TELETEXT, vec![b'e', b'n', b'g', 0x10, 0x01]).unwrap());
        assert!(stream.is_subtitles());
    }

    #[test]
    fn test_predicate_table() {
        // (stream_type, descriptor tags, video, audio, subtitles)
        let fixtures: &[(u8, &[u8], bool, bool, bool)] = &[
            (0x01, &[], true, false, false),
            (0x02, &[], true, false, false),
            (0x1B, &[], true, false, false),
            (0x24, &[], true, false, false),
            (0x03, &[], false, true, false),
            (0x0F, &[], false, true, false),
            (0x11, &[], false, true, false),
            (0x81, &[], false, true, false),
            (0x06, &[], false, false, false),
            (0x06, &[DID_AC3], false, true, false),
            (0x06, &[DID_ENHANCED_AC3], false, true, false),
            (0x06, &[DID_DTS], false, true, false),
            (0x06, &[DID_AAC], false, true, false),
            (0x06, &[DID_SUBTITLING], false, false, true),
            (0x06, &[DID_SUBTITLING, DID_AC3], false, true, true),
        ];

        for &(stream_type, tags, video, audio, subtitles) in fixtures {
            let stream = PmtStream {
                stream_type,
                descriptors: tags
                    .iter()
                    .map(|&tag| Descriptor::new(tag, vec![]).unwrap())
                    .collect(),
            };
            assert_eq!(stream.is_video(), video, "stream_type 0x{stream_type:02X}");
            assert_eq!(stream.is_audio(), audio, "stream_type 0x{stream_type:02X}");
            assert_eq!(
                stream.is_subtitles(),
                subtitles,
                "stream_type 0x{stream_type:02X}"
            );
        }
    }

    #[test]
    fn test_serialized_section_parses_from_bytes() {
        let mut pmt = Pmt::new(1, true, 0x0042, 0x0123);
        pmt.add_stream(0x0123, 0x1B);

        let mut table = BinaryTable::new();
        pmt.serialize(&mut table);
        let bytes = table.section_at(0).unwrap().serialize();

        let reparsed = Section::parse(&bytes).unwrap();
        let mut table2 = BinaryTable::new();
        table2.add_section(reparsed).unwrap();
        assert_eq!(Pmt::from_table(&table2), pmt);
    }
}

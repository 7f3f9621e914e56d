//! Elementary stream type identifiers (ISO/IEC 13818-1 table 2-29).

/// Elementary stream types relevant to service analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamType {
    /// MPEG-1 Video.
    Mpeg1Video = 0x01,
    /// MPEG-2 Video.
    Mpeg2Video = 0x02,
    /// MPEG-1 Audio.
    Mpeg1Audio = 0x03,
    /// MPEG-2 Audio.
    Mpeg2Audio = 0x04,
    /// Private sections.
    PrivateSections = 0x05,
    /// Private PES data. Carries AC-3/E-AC-3/teletext/subtitles in DVB.
    PrivateData = 0x06,
    /// AAC ADTS audio.
    AacAdts = 0x0F,
    /// MPEG-4 Visual.
    Mpeg4Visual = 0x10,
    /// AAC LATM audio.
    AacLatm = 0x11,
    /// H.264/AVC video.
    H264 = 0x1B,
    /// H.265/HEVC video.
    H265 = 0x24,
    /// AC-3 audio (ATSC).
    Ac3 = 0x81,
    /// E-AC-3 audio (ATSC).
    Eac3 = 0x87,
}

impl StreamType {
    /// Create from a raw stream_type value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(StreamType::Mpeg1Video),
            0x02 => Some(StreamType::Mpeg2Video),
            0x03 => Some(StreamType::Mpeg1Audio),
            0x04 => Some(StreamType::Mpeg2Audio),
            0x05 => Some(StreamType::PrivateSections),
            0x06 => Some(StreamType::PrivateData),
            0x0F => Some(StreamType::AacAdts),
            0x10 => Some(StreamType::Mpeg4Visual),
            0x11 => Some(StreamType::AacLatm),
            0x1B => Some(StreamType::H264),
            0x24 => Some(StreamType::H265),
            0x81 => Some(StreamType::Ac3),
            0x87 => Some(StreamType::Eac3),
            _ => None,
        }
    }

    /// Check if this is a video stream type.
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            StreamType::Mpeg1Video
                | StreamType::Mpeg2Video
                | StreamType::Mpeg4Visual
                | StreamType::H264
                | StreamType::H265
        )
    }

    /// Check if this is an audio stream type.
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            StreamType::Mpeg1Audio
                | StreamType::Mpeg2Audio
                | StreamType::AacAdts
                | StreamType::AacLatm
                | StreamType::Ac3
                | StreamType::Eac3
        )
    }
}

/// Check a raw stream_type value for a video type.
pub fn is_video_stream_type(value: u8) -> bool {
    StreamType::from_u8(value).is_some_and(|st| st.is_video())
}

/// Check a raw stream_type value for an audio type.
pub fn is_audio_stream_type(value: u8) -> bool {
    StreamType::from_u8(value).is_some_and(|st| st.is_audio())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StreamType::H264.is_video());
        assert!(StreamType::H265.is_video());
        assert!(!StreamType::H264.is_audio());

        assert!(StreamType::AacAdts.is_audio());
        assert!(StreamType::Ac3.is_audio());
        assert!(!StreamType::Ac3.is_video());

        assert!(!StreamType::PrivateData.is_audio());
        assert!(!StreamType::PrivateData.is_video());
    }

    #[test]
    fn test_raw_helpers() {
        assert!(is_video_stream_type(0x1B));
        assert!(is_audio_stream_type(0x0F));
        assert!(!is_video_stream_type(0x06));
        assert!(!is_audio_stream_type(0x06));
        assert!(!is_video_stream_type(0xFF));
    }
}

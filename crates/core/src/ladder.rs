use crate::types::Resolution;

/// Container extension shared by every rendition output.
pub const OUTPUT_EXT: &str = ".mp4";

/// One target rendition: resolution plus the encoding parameters handed to
/// ffmpeg. Entries are process-wide constants; all renditions run the same
/// task logic and differ only in this data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenditionSpec {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    /// `-b:v`
    pub video_bitrate: &'static str,
    /// `-b:a`
    pub audio_bitrate: &'static str,
    /// `-maxrate` and `-bufsize` share this value.
    pub buffer_rate: &'static str,
    /// `-profile:v`
    pub profile: &'static str,
    /// Inserted between the source file stem and [`OUTPUT_EXT`].
    pub suffix: &'static str,
}

impl RenditionSpec {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

pub const P1080: &str = "1080p";
pub const P720: &str = "720p";
pub const P480: &str = "480p";
pub const P360: &str = "360p";
pub const P240: &str = "240p";

/// The full delivery ladder, highest fidelity first. Exactly one entry per
/// label.
pub static LADDER: &[RenditionSpec] = &[
    RenditionSpec {
        label: P1080,
        width: 1920,
        height: 1080,
        video_bitrate: "4500k",
        audio_bitrate: "192k",
        buffer_rate: "6000k",
        profile: "high",
        suffix: "_1080",
    },
    RenditionSpec {
        label: P720,
        width: 1280,
        height: 720,
        video_bitrate: "2500k",
        audio_bitrate: "128k",
        buffer_rate: "3500k",
        profile: "high",
        suffix: "_720",
    },
    RenditionSpec {
        label: P480,
        width: 854,
        height: 480,
        video_bitrate: "1200k",
        audio_bitrate: "128k",
        buffer_rate: "1800k",
        profile: "main",
        suffix: "_480",
    },
    RenditionSpec {
        label: P360,
        width: 640,
        height: 360,
        video_bitrate: "700k",
        audio_bitrate: "96k",
        buffer_rate: "1000k",
        profile: "main",
        suffix: "_360",
    },
    RenditionSpec {
        label: P240,
        width: 426,
        height: 240,
        video_bitrate: "400k",
        audio_bitrate: "64k",
        buffer_rate: "600k",
        profile: "baseline",
        suffix: "_240",
    },
];

/// Resolve a rendition label against the ladder.
pub fn lookup(label: &str) -> Option<&'static RenditionSpec> {
    LADDER.iter().find(|spec| spec.label == label)
}

/// Every label in ladder order, for callers requesting the whole ladder.
pub fn all_labels() -> Vec<&'static str> {
    LADDER.iter().map(|spec| spec.label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_labels() {
        let spec = lookup("720p").unwrap();
        assert_eq!(spec.width, 1280);
        assert_eq!(spec.height, 720);
        assert_eq!(spec.suffix, "_720");
    }

    #[test]
    fn lookup_unknown_label() {
        assert!(lookup("4k").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn labels_are_unique() {
        for (i, a) in LADDER.iter().enumerate() {
            for b in &LADDER[i + 1..] {
                assert_ne!(a.label, b.label);
            }
        }
    }

    #[test]
    fn ladder_ordered_highest_first() {
        for pair in LADDER.windows(2) {
            assert!(pair[0].height > pair[1].height);
        }
    }
}

//! Streaming-playlist (HLS) parsing
//!
//! Pure functions over the text of one playlist document. Fetching nested
//! playlists is the resolver's job; nothing here touches the network.

use url::Url;

use crate::app::util::join_url;
use crate::constants::manifest::{
    ANVATO_SEGMENT_INFO, BYTE_RANGE_TAG, FLASH_ACCESS_TAG, KEY_TAG, MAP_TAG, SESSION_KEY_TAG,
    STREAM_INF_TAG, TARGET_DURATION_TAG, UNKNOWN_QUALITY, UPLYNK_SEGMENT,
};
use crate::errors::{ManifestError, ManifestResult, UnsupportedReason};

/// One variant stream listed by a master playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// `RESOLUTION` attribute, `--` when absent
    pub quality: String,
    pub bandwidth: Option<u64>,
    /// Variant playlist URL resolved against the master's URL
    pub uri: String,
}

/// Segments of a media playlist, ads removed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaPlaylist {
    /// Segment URLs in playback order
    pub segments: Vec<String>,
    /// Segment lines outside ad blocks
    pub media_segments: usize,
    /// Segment lines inside ad blocks
    pub ad_segments: usize,
}

/// A parsed playlist document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playlist {
    Master(Vec<Variant>),
    Media(MediaPlaylist),
}

/// Parse a playlist document fetched from `base`
///
/// # Errors
///
/// `ManifestError::NotDownloadable` when the document needs DRM, byte-range
/// or initialization-map support; `ManifestError::InvalidReference` when a
/// URI cannot be resolved against `base`.
pub fn parse(document: &str, base: &Url) -> ManifestResult<Playlist> {
    check_downloadable(document)?;
    if is_master(document) {
        parse_master(document, base).map(Playlist::Master)
    } else {
        parse_media(document, base).map(Playlist::Media)
    }
}

/// Master playlists carry no per-segment target duration
pub fn is_master(document: &str) -> bool {
    !document.contains(TARGET_DURATION_TAG)
}

/// Reject documents that need capabilities beyond plain segment fetching
pub fn check_downloadable(document: &str) -> ManifestResult<()> {
    for line in document.lines().map(str::trim) {
        if line.starts_with(FLASH_ACCESS_TAG) {
            return Err(not_downloadable(UnsupportedReason::FlashAccess));
        }

        if let Some(list) = line
            .strip_prefix(KEY_TAG)
            .or_else(|| line.strip_prefix(SESSION_KEY_TAG))
        {
            let attributes = parse_attributes(list);
            let uri = attribute(&attributes, "URI").unwrap_or_default();
            let key_format = attribute(&attributes, "KEYFORMAT").unwrap_or_default();
            if uri.starts_with("skd://")
                || key_format.eq_ignore_ascii_case("com.apple.streamingkeydelivery")
            {
                return Err(not_downloadable(UnsupportedReason::FairPlay));
            }

            let method = attribute(&attributes, "METHOD").unwrap_or("NONE");
            if !(method.eq_ignore_ascii_case("NONE") || method.eq_ignore_ascii_case("AES-128")) {
                return Err(not_downloadable(UnsupportedReason::Encryption {
                    method: method.to_string(),
                }));
            }
        } else if line.starts_with(MAP_TAG) {
            return Err(not_downloadable(UnsupportedReason::InitializationMap));
        } else if line.starts_with(BYTE_RANGE_TAG) {
            return Err(not_downloadable(UnsupportedReason::ByteRange));
        }
    }
    Ok(())
}

fn not_downloadable(reason: UnsupportedReason) -> ManifestError {
    ManifestError::NotDownloadable { reason }
}

/// Variants of a master playlist in document order
pub fn parse_master(document: &str, base: &Url) -> ManifestResult<Vec<Variant>> {
    let mut variants = Vec::new();
    let mut pending: Option<(String, Option<u64>)> = None;

    for line in document.lines().map(str::trim) {
        if let Some(list) = line.strip_prefix(STREAM_INF_TAG) {
            let attributes = parse_attributes(list);
            let quality = attribute(&attributes, "RESOLUTION")
                .filter(|r| !r.is_empty())
                .unwrap_or(UNKNOWN_QUALITY)
                .to_string();
            let bandwidth = attribute(&attributes, "BANDWIDTH").and_then(|b| b.parse().ok());
            pending = Some((quality, bandwidth));
        } else if line.is_empty() || line.starts_with('#') {
            continue;
        } else if let Some((quality, bandwidth)) = pending.take() {
            variants.push(Variant {
                quality,
                bandwidth,
                uri: resolve(base, line)?,
            });
        }
    }

    tracing::debug!("Master playlist {} lists {} variants", base, variants.len());
    Ok(variants)
}

/// Segments of a media playlist with ad blocks removed
///
/// The first pass counts media and ad segments, the second emits the media
/// segments. An ad block left open at the end of the document stays open.
pub fn parse_media(document: &str, base: &Url) -> ManifestResult<MediaPlaylist> {
    let mut playlist = MediaPlaylist::default();

    scan_segments(document, |_, in_ad| {
        if in_ad {
            playlist.ad_segments += 1;
        } else {
            playlist.media_segments += 1;
        }
    });

    let mut segments = Vec::with_capacity(playlist.media_segments);
    let mut failure = None;
    scan_segments(document, |line, in_ad| {
        if in_ad || failure.is_some() {
            return;
        }
        match resolve(base, line) {
            Ok(url) => segments.push(url),
            Err(e) => failure = Some(e),
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }

    if playlist.ad_segments > 0 {
        tracing::debug!(
            "Skipped {} ad segments of {} in {}",
            playlist.ad_segments,
            playlist.ad_segments + playlist.media_segments,
            base
        );
    }
    playlist.segments = segments;
    Ok(playlist)
}

/// Visit every segment line with the ad state in effect for it
fn scan_segments<'a>(document: &'a str, mut visit: impl FnMut(&'a str, bool)) {
    let mut in_ad = false;
    for line in document.lines().map(str::trim) {
        if is_ad_start(line) {
            in_ad = true;
        } else if is_ad_end(line) {
            in_ad = false;
        } else if !line.is_empty() && !line.starts_with('#') {
            visit(line, in_ad);
        }
    }
}

fn is_ad_start(line: &str) -> bool {
    (line.starts_with(ANVATO_SEGMENT_INFO) && line.contains("type=ad"))
        || (line.starts_with(UPLYNK_SEGMENT) && line.ends_with(",ad"))
}

fn is_ad_end(line: &str) -> bool {
    (line.starts_with(ANVATO_SEGMENT_INFO) && line.contains("type=master"))
        || (line.starts_with(UPLYNK_SEGMENT) && line.ends_with(",segment"))
}

fn resolve(base: &Url, reference: &str) -> ManifestResult<String> {
    join_url(base, reference).ok_or_else(|| ManifestError::InvalidReference {
        base: base.to_string(),
        reference: reference.to_string(),
    })
}

/// Split an attribute list, honoring commas inside quoted values
pub fn parse_attributes(list: &str) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in list.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                push_attribute(&mut attributes, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_attribute(&mut attributes, &current);
    attributes
}

fn push_attribute(attributes: &mut Vec<(String, String)>, raw: &str) {
    if let Some((name, value)) = raw.split_once('=') {
        attributes.push((
            name.trim().to_ascii_uppercase(),
            value.trim().trim_matches('"').to_string(),
        ));
    }
}

fn attribute<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://cdn.example.com/hls/720/index.m3u8").unwrap()
    }

    #[test]
    fn test_anvato_ad_block_is_stripped() {
        let document = "#EXTM3U\n\
            #EXT-X-TARGETDURATION:6\n\
            #ANVATO-SEGMENT-INFO type=ad\n\
            seg_ad.ts\n\
            #ANVATO-SEGMENT-INFO type=master\n\
            seg_real.ts\n\
            #EXT-X-ENDLIST\n";

        let playlist = parse_media(document, &base()).unwrap();
        assert_eq!(
            playlist.segments,
            vec!["https://cdn.example.com/hls/720/seg_real.ts".to_string()]
        );
        assert_eq!(playlist.ad_segments, 1);
        assert_eq!(playlist.media_segments, 1);
    }

    #[test]
    fn test_uplynk_ad_block_is_stripped() {
        let document = "#EXT-X-TARGETDURATION:4\n\
            a.ts\n\
            #UPLYNK-SEGMENT:abc,00000000,ad\n\
            ad1.ts\n\
            ad2.ts\n\
            #UPLYNK-SEGMENT:abc,00000003,segment\n\
            b.ts\n";

        let playlist = parse_media(document, &base()).unwrap();
        let names: Vec<_> = playlist
            .segments
            .iter()
            .map(|s| s.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(names, vec!["a.ts", "b.ts"]);
        assert_eq!(playlist.ad_segments, 2);
    }

    #[test]
    fn test_unterminated_ad_block_suppresses_rest() {
        let document = "#EXT-X-TARGETDURATION:4\n\
            a.ts\n\
            #ANVATO-SEGMENT-INFO type=ad\n\
            ad.ts\n\
            b.ts\n";

        let playlist = parse_media(document, &base()).unwrap();
        assert_eq!(playlist.segments.len(), 1);
        assert!(playlist.segments[0].ends_with("/a.ts"));
    }

    #[test]
    fn test_absolute_segments_pass_through() {
        let document = "#EXT-X-TARGETDURATION:4\n\
            https://other.example.com/x/seg.ts?token=a%2Fb\n\
            /root.ts\n";

        let playlist = parse_media(document, &base()).unwrap();
        assert_eq!(
            playlist.segments,
            vec![
                "https://other.example.com/x/seg.ts?token=a%2Fb".to_string(),
                "https://cdn.example.com/root.ts".to_string(),
            ]
        );
    }

    #[test]
    fn test_sample_aes_is_rejected() {
        let document = "#EXTM3U\n\
            #EXT-X-TARGETDURATION:6\n\
            #EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"https://keys.example.com/k\"\n\
            seg1.ts\n";

        match parse(document, &base()) {
            Err(ManifestError::NotDownloadable {
                reason: UnsupportedReason::Encryption { method },
            }) => assert_eq!(method, "SAMPLE-AES"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_aes_128_and_none_are_accepted() {
        let document = "#EXT-X-TARGETDURATION:6\n\
            #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x1\n\
            seg1.ts\n\
            #EXT-X-KEY:METHOD=NONE\n\
            seg2.ts\n";

        let playlist = parse_media(document, &base()).unwrap();
        assert!(check_downloadable(document).is_ok());
        assert_eq!(playlist.segments.len(), 2);
    }

    #[test]
    fn test_unsupported_features_are_rejected() {
        let cases = [
            ("#EXT-X-FAXS-CM:MIIa", UnsupportedReason::FlashAccess),
            (
                "#EXT-X-SESSION-KEY:METHOD=SAMPLE-AES,URI=\"skd://key\"",
                UnsupportedReason::FairPlay,
            ),
            (
                "#EXT-X-KEY:METHOD=SAMPLE-AES,KEYFORMAT=\"com.apple.streamingkeydelivery\"",
                UnsupportedReason::FairPlay,
            ),
            ("#EXT-X-MAP:URI=\"init.mp4\"", UnsupportedReason::InitializationMap),
            ("#EXT-X-BYTERANGE:1024@0", UnsupportedReason::ByteRange),
        ];

        for (line, expected) in cases {
            let document = format!("#EXTM3U\n#EXT-X-TARGETDURATION:6\n{}\nseg.ts\n", line);
            match check_downloadable(&document) {
                Err(ManifestError::NotDownloadable { reason }) => assert_eq!(reason, expected),
                other => panic!("{} gave {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_master_playlist_variants() {
        let document = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=5000000,CODECS=\"avc1.640028,mp4a.40.2\",RESOLUTION=1920x1080\n\
            1080/index.m3u8\n\
            \n\
            #EXT-X-STREAM-INF:BANDWIDTH=800000\n\
            https://mirror.example.com/low.m3u8\n";
        let base = Url::parse("https://cdn.example.com/hls/master.m3u8").unwrap();

        assert!(is_master(document));
        let variants = parse_master(document, &base).unwrap();
        assert_eq!(
            variants,
            vec![
                Variant {
                    quality: "1920x1080".to_string(),
                    bandwidth: Some(5_000_000),
                    uri: "https://cdn.example.com/hls/1080/index.m3u8".to_string(),
                },
                Variant {
                    quality: "--".to_string(),
                    bandwidth: Some(800_000),
                    uri: "https://mirror.example.com/low.m3u8".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_attributes_honors_quotes() {
        let attributes = parse_attributes("BANDWIDTH=1,codecs=\"a,b\",RESOLUTION=640x360");
        assert_eq!(attribute(&attributes, "CODECS"), Some("a,b"));
        assert_eq!(attribute(&attributes, "RESOLUTION"), Some("640x360"));
        assert_eq!(attributes.len(), 3);
    }
}

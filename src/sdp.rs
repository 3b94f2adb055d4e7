//! Line-oriented session description transforms
//!
//! Pure text functions that rewrite an already-valid description to express
//! codec preference and bandwidth caps before it is handed to the signaling
//! relay. No SDP grammar parsing happens here: the functions operate on
//! CRLF-separated lines and return the input unchanged when the structure
//! they target is absent.

use crate::config::MediaKind;

/// Move the given payload id to the front of a media-description line
///
/// A media line lists its payload ids starting at the fourth
/// whitespace-separated token:
///
/// ```text
/// m=video 60372 UDP/TLS/RTP/SAVPF 100 101 116 117 96
/// ```
///
/// The target id ends up at that position exactly once; all other ids keep
/// their relative order. An id that is not present in the line is inserted
/// anyway, which leaves the original ordering otherwise intact.
pub fn set_default_codec(m_line: &str, payload_id: &str) -> String {
    let mut rebuilt: Vec<&str> = Vec::new();
    for token in m_line.split(' ') {
        if rebuilt.len() == 3 {
            rebuilt.push(payload_id);
        }
        if token != payload_id || rebuilt.len() < 3 {
            rebuilt.push(token);
        }
    }
    rebuilt.join(" ")
}

/// Rewrite the description to prefer the named codec for one media kind
///
/// Finds the most recent media-description line for `media_kind` and every
/// codec-mapping line mentioning `codec`, extracts the numeric payload id
/// preceding the first space on each match, and applies
/// [`set_default_codec`] with the **first** matched id. A codec can map to
/// several payload ids; only the first one encountered is honored.
///
/// Returns the input unchanged when no media line or no codec-mapping line
/// matches.
pub fn prefer_codec(sdp: &str, media_kind: MediaKind, codec: &str) -> String {
    let mut lines: Vec<String> = sdp.split("\r\n").map(str::to_string).collect();
    let media_prefix = format!("m={}", media_kind.as_str());

    let mut m_line_index = None;
    let mut codec_ids: Vec<String> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.contains(&media_prefix) {
            m_line_index = Some(i);
        }
        if line.contains(codec) {
            // codec-mapping line format: a=rtpmap:126 H264/90000
            // the payload id sits between the ':' and the first space
            if let (Some(colon), Some(space)) = (line.find(':'), line.find(' ')) {
                if space > colon + 1 {
                    codec_ids.push(line[colon + 1..space].to_string());
                }
            }
        }
    }

    let (index, id) = match (m_line_index, codec_ids.first()) {
        (Some(index), Some(id)) => (index, id.clone()),
        _ => return sdp.to_string(),
    };

    lines[index] = set_default_codec(&lines[index], &id);
    lines.join("\r\n")
}

/// Inject a bandwidth cap for one media section of the description
///
/// The `b=AS:<kbps>` line must follow the `c=` line when one exists, which
/// itself follows the optional `i=` line after the media-description line,
/// so the insertion point is found by skipping those. A section that
/// already carries a bandwidth line is left untouched, as is a description
/// with no matching media line at all.
pub fn set_bitrate(sdp: &str, media_kind: MediaKind, bitrate_kbps: u32) -> String {
    let mut lines: Vec<String> = sdp.split("\r\n").map(str::to_string).collect();
    let media_prefix = format!("m={}", media_kind.as_str());

    let m_line_index = match lines.iter().position(|line| line.contains(&media_prefix)) {
        Some(index) => index,
        None => return sdp.to_string(),
    };

    let mut index = m_line_index + 1;
    while index < lines.len()
        && (lines[index].starts_with("i=") || lines[index].starts_with("c="))
    {
        index += 1;
    }

    if index < lines.len() && lines[index].starts_with("b=AS") {
        return sdp.to_string();
    }

    lines.insert(index, format!("b=AS:{}", bitrate_kbps));
    lines.join("\r\n")
}

//! SDP bandwidth munging
//!
//! Bandwidth caps are embedded in the SDP as `b=AS:<kbps>` lines inside the
//! media sections of the matching kind. The rest of the description is left
//! byte for byte intact, including its line endings.

use crate::types::MediaKind;

const MEDIA_PREFIX: &str = "m=";
const BANDWIDTH_AS_PREFIX: &str = "b=AS:";

fn line_ending(sdp: &str) -> &'static str {
    if sdp.contains("\r\n") { "\r\n" } else { "\n" }
}

fn media_kind_of(line: &str) -> Option<&str> {
    line.strip_prefix(MEDIA_PREFIX)
        .and_then(|rest| rest.split_whitespace().next())
}

/// Replace the `b=AS` line of every `kind` media section with `kbps`.
///
/// The new line goes right after the section's `m=`, `i=` and `c=` lines, as
/// required by the SDP field order.
pub fn set_media_bandwidth(sdp: &str, kind: MediaKind, kbps: u32) -> String {
    let eol = line_ending(sdp);
    let kind_name = kind.to_string();
    let trailing_eol = sdp.ends_with('\n');

    let mut out: Vec<String> = Vec::new();
    let mut in_section = false;
    let mut pending_insert = false;

    for line in sdp.lines() {
        let line = line.trim_end_matches('\r');

        if line.starts_with(MEDIA_PREFIX) {
            if pending_insert {
                out.push(format!("{}{}", BANDWIDTH_AS_PREFIX, kbps));
            }
            in_section = media_kind_of(line) == Some(kind_name.as_str());
            pending_insert = in_section;
            out.push(line.to_string());
            continue;
        }

        if in_section {
            if line.starts_with(BANDWIDTH_AS_PREFIX) {
                continue;
            }
            if pending_insert && !(line.starts_with("i=") || line.starts_with("c=")) {
                out.push(format!("{}{}", BANDWIDTH_AS_PREFIX, kbps));
                pending_insert = false;
            }
        }
        out.push(line.to_string());
    }
    if pending_insert {
        out.push(format!("{}{}", BANDWIDTH_AS_PREFIX, kbps));
    }

    let mut munged = out.join(eol);
    if trailing_eol {
        munged.push_str(eol);
    }
    munged
}

/// The `b=AS` value of the first `kind` media section
pub fn bandwidth_for(sdp: &str, kind: MediaKind) -> Option<u32> {
    let kind_name = kind.to_string();
    let mut in_section = false;
    for line in sdp.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(MEDIA_PREFIX) {
            in_section = media_kind_of(line) == Some(kind_name.as_str());
        } else if in_section {
            if let Some(value) = line.strip_prefix(BANDWIDTH_AS_PREFIX) {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

pub fn media_section_count(sdp: &str) -> usize {
    sdp.lines().filter(|l| l.starts_with(MEDIA_PREFIX)).count()
}

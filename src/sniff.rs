//! Content sniffing for resources without a declared or guessable type.

/// Bytes examined when sniffing.
pub const SNIFF_LEN: usize = 512;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"OggS\x00", "application/ogg"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"Rar!\x1A\x07", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML", b"<HTML", b"<HEAD", b"<SCRIPT", b"<IFRAME", b"<H1", b"<DIV", b"<FONT",
    b"<TABLE", b"<A", b"<STYLE", b"<TITLE", b"<B", b"<BODY", b"<BR", b"<P", b"<!--",
];

/// Best-effort media type for the leading bytes of some content. Only the
/// first [`SNIFF_LEN`] bytes are considered.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if let Some(&(_, media_type)) = SIGNATURES.iter().find(|(magic, _)| data.starts_with(magic)) {
        return media_type;
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return "image/webp";
    }

    let text = match data.iter().position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')) {
        Some(i) => &data[i..],
        None => &[][..],
    };
    if text.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }
    if HTML_TAGS.iter().any(|tag| is_html_tag(text, tag)) {
        return "text/html; charset=utf-8";
    }
    if data.starts_with(b"\xEF\xBB\xBF") || !data.iter().any(|&b| is_binary(b)) {
        return "text/plain; charset=utf-8";
    }
    "application/octet-stream"
}

// tag must be followed by a space or '>' and matches case-insensitively
fn is_html_tag(data: &[u8], tag: &[u8]) -> bool {
    data.len() > tag.len()
        && data[..tag.len()].eq_ignore_ascii_case(tag)
        && matches!(data[tag.len()], b' ' | b'>')
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

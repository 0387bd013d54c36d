//! Content type detection for uploaded files.

/// Only this many leading bytes are inspected.
const SNIFF_LEN: usize = 512;

const OCTET_STREAM: &str = "application/octet-stream";

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"ID3", "audio/mpeg"),
    (b"OggS\x00", "application/ogg"),
];

/// Guess the media type of `data`. Files the sniffer cannot place fall back
/// to the extension for a few plain-text formats.
pub fn content_type(data: &[u8], extension: Option<&str>) -> String {
    let sniffed = sniff(&data[..data.len().min(SNIFF_LEN)]);
    if sniffed == OCTET_STREAM {
        let ext = extension.map(|e| e.to_ascii_lowercase());
        if matches!(ext.as_deref(), Some("txt" | "log" | "csv")) {
            return mime::TEXT_PLAIN.to_string();
        }
    }
    sniffed.to_string()
}

fn sniff(head: &[u8]) -> &'static str {
    for &(magic, kind) in SIGNATURES {
        if head.starts_with(magic) {
            return kind;
        }
    }

    if head.len() >= 12 && head.starts_with(b"RIFF") {
        match &head[8..12] {
            b"WEBP" => return "image/webp",
            b"WAVE" => return "audio/wave",
            _ => {}
        }
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return "video/mp4";
    }

    if looks_like_text(head) {
        "text/plain; charset=utf-8"
    } else {
        OCTET_STREAM
    }
}

/// No control bytes other than whitespace and escape, and valid UTF-8 up to
/// a character cut off at the sniff boundary.
fn looks_like_text(head: &[u8]) -> bool {
    let binary = head
        .iter()
        .any(|&b| matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f));
    if binary {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_magic_numbers() {
        assert_eq!(content_type(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR", None), "image/png");
        assert_eq!(content_type(b"\xff\xd8\xff\xe0\0\x10JFIF", Some("jpg")), "image/jpeg");
        assert_eq!(content_type(b"%PDF-1.7\n", Some("pdf")), "application/pdf");
        assert_eq!(content_type(b"RIFF\0\0\0\0WEBPVP8 ", None), "image/webp");
        assert_eq!(content_type(b"RIFF\0\0\0\0WAVEfmt ", None), "audio/wave");
        assert_eq!(content_type(b"\0\0\0\x18ftypmp42", None), "video/mp4");
    }

    #[test]
    fn plain_text_is_utf8() {
        assert_eq!(content_type("héllo\n".as_bytes(), None), mime::TEXT_PLAIN_UTF_8.as_ref());
    }

    #[test]
    fn unknown_binary_falls_back_to_extension() {
        let blob = [0x00, 0x01, 0x02, 0x03];
        assert_eq!(content_type(&blob, None), "application/octet-stream");
        assert_eq!(content_type(&blob, Some("bin")), "application/octet-stream");
        assert_eq!(content_type(&blob, Some("CSV")), "text/plain");
    }

    #[test]
    fn only_the_head_is_inspected() {
        let mut data = b"just text ".repeat(60);
        data.push(0x00);
        assert_eq!(content_type(&data, None), "text/plain; charset=utf-8");
    }
}

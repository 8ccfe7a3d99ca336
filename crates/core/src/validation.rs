/// Leading bytes of every PDF file.
pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

/// Magic-number sniff: true iff the buffer starts with `%PDF`.
/// Does not parse the document, so trailing corruption goes unnoticed.
pub fn is_valid_pdf(buffer: &[u8]) -> bool {
    buffer.starts_with(PDF_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_pdf_accepts_signature() {
        assert!(is_valid_pdf(b"%PDF"));
        assert!(is_valid_pdf(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3"));
    }

    #[test]
    fn test_is_valid_pdf_rejects_short_buffers() {
        assert!(!is_valid_pdf(b""));
        assert!(!is_valid_pdf(b"%PD"));
    }

    #[test]
    fn test_is_valid_pdf_rejects_other_content() {
        assert!(!is_valid_pdf(b"not a pdf"));
        assert!(!is_valid_pdf(b" %PDF-1.4"));
        assert!(!is_valid_pdf(b"%pdf-1.4"));
        assert!(!is_valid_pdf(b"PK\x03\x04"));
    }

    #[test]
    fn test_is_valid_pdf_matches_definition_for_all_short_prefixes() {
        let samples: [&[u8]; 6] = [b"", b"%", b"%P", b"%PD", b"%PDF", b"%PDFx"];
        for sample in samples {
            let expected = sample.len() >= 4 && &sample[0..4] == b"%PDF";
            assert_eq!(is_valid_pdf(sample), expected, "sample {sample:?}");
        }
    }
}

use std::io::{Cursor, Read};

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

static BLANK_LINE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*){2,}").expect("valid regex"));

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("could not read PDF: {0}")]
    Pdf(String),
    #[error("could not read Word document: {0}")]
    Docx(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Word,
}

impl DocumentKind {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type.trim().to_ascii_lowercase().as_str() {
            PDF_MIME => Some(DocumentKind::Pdf),
            DOCX_MIME => Some(DocumentKind::Word),
            _ => None,
        }
    }
}

/// Plain text of an uploaded PDF or Word file.
pub fn extract_text(mime_type: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let kind = DocumentKind::from_mime(mime_type)
        .ok_or_else(|| ExtractError::Unsupported(mime_type.to_string()))?;

    let raw = match kind {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?,
        DocumentKind::Word => extract_docx_text(bytes)?,
    };

    Ok(collapse_blank_lines(&raw))
}

fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    paragraphs_from_document_xml(&xml).map(|paragraphs| paragraphs.join("\n"))
}

/// Text of every `<w:p>` in `word/document.xml`, one entry per paragraph.
fn paragraphs_from_document_xml(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                b"w:p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.decode().map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::GeneralRef(r)) if in_text => {
                if let Ok(Some(ch)) = r.resolve_char_ref() {
                    current.push(ch);
                } else {
                    let name = r.decode().map_err(|e| ExtractError::Docx(e.to_string()))?;
                    if let Some(value) = quick_xml::escape::resolve_predefined_entity(&name) {
                        current.push_str(value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
        }
    }

    Ok(paragraphs)
}

fn collapse_blank_lines(text: &str) -> String {
    BLANK_LINE_RUNS.replace_all(text.trim(), "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>春季防火</w:t></w:r><w:r><w:t xml:space="preserve"> 通知</w:t></w:r></w:p>
    <w:p/>
    <w:p><w:r><w:t>各护林站 &amp; 周边村民</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn build_docx(document_xml: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    fn build_pdf(line: &str) -> Vec<u8> {
        let stream = format!("BT /F1 18 Tf 72 720 Td ({}) Tj ET", line);
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
                .to_string(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
            format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, object) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, object).as_bytes());
        }

        let xref_at = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_at
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    fn test_document_kind_from_mime() {
        assert_eq!(DocumentKind::from_mime("application/pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_mime(DOCX_MIME), Some(DocumentKind::Word));
        assert_eq!(DocumentKind::from_mime("text/plain"), None);
    }

    #[test]
    fn test_paragraphs_from_document_xml() {
        let paragraphs = paragraphs_from_document_xml(DOCUMENT_XML).unwrap();
        assert_eq!(paragraphs, vec!["春季防火 通知", "", "各护林站 & 周边村民"]);
    }

    #[test]
    fn test_extract_docx() {
        let bytes = build_docx(DOCUMENT_XML);
        let text = extract_text(DOCX_MIME, &bytes).unwrap();
        assert_eq!(text, "春季防火 通知\n\n各护林站 & 周边村民");
    }

    #[test]
    fn test_extract_unsupported_type() {
        let err = extract_text("image/png", b"\x89PNG").unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(ref m) if m == "image/png"));
    }

    #[test]
    fn test_extract_corrupt_docx() {
        let err = extract_text(DOCX_MIME, b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn test_extract_pdf() {
        let bytes = build_pdf("Patrol log");
        let text = extract_text(PDF_MIME, &bytes).unwrap();
        assert!(text.contains("Patrol"), "unexpected text: {:?}", text);
        assert!(!text.starts_with('\n'));
    }

    #[test]
    fn test_extract_corrupt_pdf() {
        let err = extract_text(PDF_MIME, b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n b"), "a\n\nb");
        assert_eq!(collapse_blank_lines("\n a\nb \n"), "a\nb");
    }
}

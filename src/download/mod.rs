use anyhow::Result;
use regex::Regex;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::backend::Document;

/// Formats a document can be downloaded in. Generated content is stored as
/// Markdown; the other formats are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFormat {
    Txt,
    Markdown,
    Html,
    Docx,
}

impl DownloadFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "txt" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Txt => "text/plain; charset=utf-8",
            Self::Markdown => "text/markdown; charset=utf-8",
            Self::Html => "text/html; charset=utf-8",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Docx => "docx",
        }
    }
}

pub fn render(document: &Document, format: DownloadFormat) -> Result<Vec<u8>> {
    Ok(match format {
        DownloadFormat::Markdown => document.content.clone().into_bytes(),
        DownloadFormat::Txt => markdown_to_text(&document.content).into_bytes(),
        DownloadFormat::Html => render_html(&document.title, &document.content).into_bytes(),
        DownloadFormat::Docx => render_docx(&document.content)?,
    })
}

/// Attachment filename derived from the document title: keep word
/// characters, hyphens and spaces, collapse the rest.
pub fn download_filename(title: &str, format: DownloadFormat) -> String {
    let pattern = Regex::new(r"[^\w\- ]").unwrap();
    let cleaned = pattern.replace_all(title, "");
    let mut stem: String = cleaned.trim().replace(' ', "_").chars().take(100).collect();
    if stem.is_empty() {
        stem = "document".to_string();
    }
    format!("{}.{}", stem, format.extension())
}

fn markdown_to_text(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let line = line.trim_start_matches('#').trim_start();
        let line = line.replace("**", "").replace("__", "");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Line-oriented Markdown to HTML: headings, bullet lists, paragraphs and
/// bold spans. Enough for transcription documents; not a general parser.
fn render_html(title: &str, content: &str) -> String {
    let mut body = String::new();
    let mut in_list = false;

    for line in content.lines() {
        let trimmed = line.trim();
        let is_item = trimmed.starts_with("- ") || trimmed.starts_with("* ");
        if in_list && !is_item {
            body.push_str("</ul>\n");
            in_list = false;
        }

        if trimmed.is_empty() {
            continue;
        } else if let Some(rest) = trimmed.strip_prefix("### ") {
            body.push_str(&format!("<h3>{}</h3>\n", inline_html(rest)));
        } else if let Some(rest) = trimmed.strip_prefix("## ") {
            body.push_str(&format!("<h2>{}</h2>\n", inline_html(rest)));
        } else if let Some(rest) = trimmed.strip_prefix("# ") {
            body.push_str(&format!("<h1>{}</h1>\n", inline_html(rest)));
        } else if is_item {
            if !in_list {
                body.push_str("<ul>\n");
                in_list = true;
            }
            body.push_str(&format!("<li>{}</li>\n", inline_html(&trimmed[2..])));
        } else {
            body.push_str(&format!("<p>{}</p>\n", inline_html(trimmed)));
        }
    }
    if in_list {
        body.push_str("</ul>\n");
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_xml(title),
        body
    )
}

fn inline_html(text: &str) -> String {
    let escaped = escape_xml(text);
    // Pair up ** markers into <strong> spans
    let mut out = String::with_capacity(escaped.len());
    let mut open = false;
    let mut rest = escaped.as_str();
    while let Some(idx) = rest.find("**") {
        out.push_str(&rest[..idx]);
        out.push_str(if open { "</strong>" } else { "<strong>" });
        open = !open;
        rest = &rest[idx + 2..];
    }
    out.push_str(rest);
    if open {
        out.push_str("</strong>");
    }
    out
}

/// Minimal OOXML package: content types, package rels and the document
/// part. Headings become bold runs; every other line is a plain paragraph.
fn render_docx(content: &str) -> Result<Vec<u8>> {
    let mut paragraphs = String::new();
    for line in content.lines() {
        let trimmed = line.trim();
        let (text, bold) = match trimmed.strip_prefix('#') {
            Some(rest) => (rest.trim_start_matches('#').trim_start(), true),
            None => (trimmed, false),
        };
        let props = if bold { "<w:rPr><w:b/></w:rPr>" } else { "" };
        paragraphs.push_str(&format!(
            "<w:p><w:r>{}<w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
            props,
            escape_xml(text)
        ));
    }

    let document_xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{}</w:body></w:document>",
        paragraphs
    );

    let content_types = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
         </Types>";

    let rels = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
         <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\
         </Relationships>";

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file("[Content_Types].xml", options)?;
    writer.write_all(content_types.as_bytes())?;
    writer.start_file("_rels/.rels", options)?;
    writer.write_all(rels.as_bytes())?;
    writer.start_file("word/document.xml", options)?;
    writer.write_all(document_xml.as_bytes())?;

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Read;
    use uuid::Uuid;

    fn sample_document() -> Document {
        Document {
            id: Uuid::new_v4(),
            user_id: "user-123".to_string(),
            title: "Weekly Sync: Q3 <draft>".to_string(),
            content: "# Weekly Sync\n\nAttendees were **all** present.\n\n- budget\n- hiring\n"
                .to_string(),
            pinned: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn format_parsing() {
        assert_eq!(DownloadFormat::parse("txt"), Some(DownloadFormat::Txt));
        assert_eq!(DownloadFormat::parse("md"), Some(DownloadFormat::Markdown));
        assert_eq!(DownloadFormat::parse("docx"), Some(DownloadFormat::Docx));
        assert_eq!(DownloadFormat::parse("pdf"), None);
    }

    #[test]
    fn txt_strips_markdown_markers() {
        let text =
            String::from_utf8(render(&sample_document(), DownloadFormat::Txt).unwrap()).unwrap();
        assert!(text.starts_with("Weekly Sync\n"));
        assert!(text.contains("Attendees were all present."));
        assert!(!text.contains("**"));
    }

    #[test]
    fn html_renders_headings_lists_and_bold() {
        let html =
            String::from_utf8(render(&sample_document(), DownloadFormat::Html).unwrap()).unwrap();
        assert!(html.contains("<h1>Weekly Sync</h1>"));
        assert!(html.contains("<strong>all</strong>"));
        assert!(html.contains("<ul>\n<li>budget</li>\n<li>hiring</li>\n</ul>"));
        // Title is escaped
        assert!(html.contains("Weekly Sync: Q3 &lt;draft&gt;"));
    }

    #[test]
    fn docx_is_a_valid_package() {
        let bytes = render(&sample_document(), DownloadFormat::Docx).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"[Content_Types].xml".to_string()));
        assert!(names.contains(&"word/document.xml".to_string()));

        let mut document_xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut document_xml)
            .unwrap();
        assert!(document_xml.contains("Weekly Sync"));
        assert!(document_xml.contains("<w:b/>"));
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(
            download_filename("Weekly Sync: Q3 <draft>", DownloadFormat::Docx),
            "Weekly_Sync_Q3_draft.docx"
        );
        assert_eq!(download_filename("///", DownloadFormat::Txt), "document.txt");
    }
}
